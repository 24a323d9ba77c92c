//! Per-action allow-lists. A caller's capabilities come from its `Role` and
//! nothing else.

use super::models::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    ViewDashboard,
    ManageUsers,
    ManageOrganization,
    ManageCrews,
    ManageSurveys,
    ViewRequests,
    CreateRequest,
    EditRequest,
    ModerateRequest,
    AnswerRequest,
}

impl Role {
    pub fn allows(self, permission: Permission) -> bool {
        use Permission::*;
        match permission {
            ViewDashboard | ManageUsers | ManageOrganization | ManageCrews | ManageSurveys
            | EditRequest | ModerateRequest => matches!(self, Role::Secpla),
            CreateRequest => matches!(self, Role::Secpla | Role::Territorial),
            ViewRequests | AnswerRequest => true,
        }
    }
}

/// Which requests a role sees in the active listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestScope {
    All,
    OwnedBy(i32),
    LedBy(i32),
}

impl RequestScope {
    pub fn for_caller(role: Role, user_id: i32) -> Self {
        match role {
            Role::Territorial => RequestScope::OwnedBy(user_id),
            Role::Cuadrilla => RequestScope::LedBy(user_id),
            _ => RequestScope::All,
        }
    }
}

/// Multimedia may be attached by administrators or by the leader of the crew
/// assigned to the request.
pub fn may_attach_media(role: Role, caller_id: i32, crew_leader: Option<i32>) -> bool {
    matches!(role, Role::Secpla) || crew_leader == Some(caller_id)
}
