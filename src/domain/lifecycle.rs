//! Block / unblock transitions for every entity carrying an `EntityState`.

use super::access::Permission;
use super::models::EntityState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Block,
    Unblock,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("already blocked")]
    AlreadyBlocked,
    #[error("already active")]
    AlreadyActive,
}

impl Transition {
    pub fn from_state(self) -> EntityState {
        match self {
            Transition::Block => EntityState::Activo,
            Transition::Unblock => EntityState::Bloqueado,
        }
    }

    pub fn to_state(self) -> EntityState {
        match self {
            Transition::Block => EntityState::Bloqueado,
            Transition::Unblock => EntityState::Activo,
        }
    }

    /// Validates the move from `current`, returning the state to write.
    pub fn apply(self, current: EntityState) -> Result<EntityState, TransitionError> {
        if current == self.from_state() {
            return Ok(self.to_state());
        }
        Err(match self {
            Transition::Block => TransitionError::AlreadyBlocked,
            Transition::Unblock => TransitionError::AlreadyActive,
        })
    }
}

/// Tables that carry a `state` column. The table name never comes from input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stateful {
    Direction,
    Department,
    Crew,
    SurveyType,
    Survey,
    Question,
    Request,
    RequestStatus,
}

impl Stateful {
    pub fn table(self) -> &'static str {
        match self {
            Stateful::Direction => "directions",
            Stateful::Department => "departments",
            Stateful::Crew => "crews",
            Stateful::SurveyType => "survey_types",
            Stateful::Survey => "surveys",
            Stateful::Question => "questions",
            Stateful::Request => "requests",
            Stateful::RequestStatus => "request_statuses",
        }
    }

    /// Permission guarding block, unblock and delete on this table.
    pub fn permission(self) -> Permission {
        match self {
            Stateful::Direction | Stateful::Department => Permission::ManageOrganization,
            Stateful::Crew => Permission::ManageCrews,
            Stateful::SurveyType | Stateful::Survey | Stateful::Question => Permission::ManageSurveys,
            Stateful::Request | Stateful::RequestStatus => Permission::ModerateRequest,
        }
    }

    /// Noun with article, for notices ("Se ha bloqueado la encuesta.").
    pub fn noun(self) -> &'static str {
        match self {
            Stateful::Direction => "la dirección",
            Stateful::Department => "el departamento",
            Stateful::Crew => "la cuadrilla",
            Stateful::SurveyType => "el tipo de encuesta",
            Stateful::Survey => "la encuesta",
            Stateful::Question => "la pregunta",
            Stateful::Request => "la solicitud",
            Stateful::RequestStatus => "el estado",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_moves_active_to_blocked() {
        assert_eq!(Transition::Block.apply(EntityState::Activo), Ok(EntityState::Bloqueado));
    }

    #[test]
    fn unblock_moves_blocked_to_active() {
        assert_eq!(Transition::Unblock.apply(EntityState::Bloqueado), Ok(EntityState::Activo));
    }

    #[test]
    fn repeated_transitions_are_rejected() {
        assert_eq!(
            Transition::Block.apply(EntityState::Bloqueado),
            Err(TransitionError::AlreadyBlocked)
        );
        assert_eq!(
            Transition::Unblock.apply(EntityState::Activo),
            Err(TransitionError::AlreadyActive)
        );
    }

    #[test]
    fn every_stateful_table_is_distinct() {
        let all = [
            Stateful::Direction,
            Stateful::Department,
            Stateful::Crew,
            Stateful::SurveyType,
            Stateful::Survey,
            Stateful::Question,
            Stateful::Request,
            Stateful::RequestStatus,
        ];
        let mut tables: Vec<_> = all.iter().map(|s| s.table()).collect();
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), all.len());
    }

    #[test]
    fn only_administrators_toggle_catalog_rows() {
        use crate::domain::models::Role;
        for entity in [Stateful::Direction, Stateful::Crew, Stateful::Question, Stateful::Request] {
            assert!(Role::Secpla.allows(entity.permission()));
            assert!(!Role::Territorial.allows(entity.permission()));
            assert!(!Role::Cuadrilla.allows(entity.permission()));
        }
    }
}
