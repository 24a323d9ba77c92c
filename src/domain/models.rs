use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed groups a profile can belong to. The numeric ids are the `groups.id`
/// values seeded at startup.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Secpla,
    Direccion,
    Departamento,
    Territorial,
    Cuadrilla,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoleError {
    #[error("unknown role id {0}")]
    Unknown(i32),
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Secpla,
        Role::Direccion,
        Role::Departamento,
        Role::Territorial,
        Role::Cuadrilla,
    ];

    pub fn id(self) -> i32 {
        match self {
            Role::Secpla => 1,
            Role::Direccion => 2,
            Role::Departamento => 3,
            Role::Territorial => 4,
            Role::Cuadrilla => 5,
        }
    }

    /// Name stored in `groups.name`.
    pub fn group_name(self) -> &'static str {
        match self {
            Role::Secpla => "Administrador",
            Role::Direccion => "Direccion",
            Role::Departamento => "Departamento",
            Role::Territorial => "Territorial",
            Role::Cuadrilla => "Cuadrilla",
        }
    }

    /// Where a caller of this role lands after login or a denied action.
    pub fn landing_path(self) -> &'static str {
        match self {
            Role::Secpla => "/panel",
            _ => "/solicitudes",
        }
    }
}

impl TryFrom<i32> for Role {
    type Error = RoleError;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        Role::ALL
            .into_iter()
            .find(|role| role.id() == id)
            .ok_or(RoleError::Unknown(id))
    }
}

/// Soft enable/disable flag carried by every primary entity.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "entity_state")]
pub enum EntityState {
    Activo,
    Bloqueado,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::Activo => f.write_str("Activo"),
            EntityState::Bloqueado => f.write_str("Bloqueado"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "request_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Baja,
    #[default]
    Normal,
    Alta,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Baja, Priority::Normal, Priority::Alta];

    /// Parses a form value; blank input is the default priority.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" => Some(Priority::default()),
            "baja" => Some(Priority::Baja),
            "normal" => Some(Priority::Normal),
            "alta" => Some(Priority::Alta),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "media_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Imagen,
    Video,
    Audio,
}

impl MediaKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "imagen" => Some(MediaKind::Imagen),
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Imagen => "Imagen",
            MediaKind::Video => "Video",
            MediaKind::Audio => "Audio",
        }
    }
}

/// A multimedia item belongs to exactly one of these.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum MediaOwner {
    Answer(i32),
    Request(i32),
}

impl MediaOwner {
    pub fn from_columns(answer_id: Option<i32>, request_id: Option<i32>) -> Option<Self> {
        match (answer_id, request_id) {
            (Some(id), None) => Some(MediaOwner::Answer(id)),
            (None, Some(id)) => Some(MediaOwner::Request(id)),
            _ => None,
        }
    }

    pub fn columns(self) -> (Option<i32>, Option<i32>) {
        match self {
            MediaOwner::Answer(id) => (Some(id), None),
            MediaOwner::Request(id) => (None, Some(id)),
        }
    }
}

/// Status names the dashboard groups requests by.
pub mod status_names {
    pub const CREATED: &str = "Creada";
    pub const OPEN: &[&str] = &["Abierta", "Creada"];
    pub const DERIVED: &[&str] = &["Derivada"];
    pub const REJECTED: &[&str] = &["Rechazada"];
    pub const FINISHED: &[&str] = &["Finalizada", "Resuelta", "Validada"];
    pub const SEEDED: &[&str] = &[
        "Creada",
        "Abierta",
        "Derivada",
        "Rechazada",
        "Finalizada",
        "Resuelta",
        "Validada",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ids_round_trip_through_try_from() {
        for role in Role::ALL {
            assert_eq!(Role::try_from(role.id()), Ok(role));
        }
    }

    #[test]
    fn unknown_role_id_is_an_error() {
        assert_eq!(Role::try_from(0), Err(RoleError::Unknown(0)));
        assert_eq!(Role::try_from(6), Err(RoleError::Unknown(6)));
    }

    #[test]
    fn only_administrators_land_on_the_panel() {
        assert_eq!(Role::Secpla.landing_path(), "/panel");
        assert_eq!(Role::Territorial.landing_path(), "/solicitudes");
        assert_eq!(Role::Cuadrilla.landing_path(), "/solicitudes");
    }

    #[test]
    fn media_owner_requires_exactly_one_column() {
        assert_eq!(MediaOwner::from_columns(Some(3), None), Some(MediaOwner::Answer(3)));
        assert_eq!(MediaOwner::from_columns(None, Some(9)), Some(MediaOwner::Request(9)));
        assert_eq!(MediaOwner::from_columns(Some(3), Some(9)), None);
        assert_eq!(MediaOwner::from_columns(None, None), None);
    }

    #[test]
    fn priority_parses_from_form_values() {
        let parsed: Priority = serde_json::from_str("\"alta\"").unwrap();
        assert_eq!(parsed, Priority::Alta);
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(Priority::parse(" "), Some(Priority::Normal));
        assert_eq!(Priority::parse("urgente"), None);
    }

    #[test]
    fn dashboard_buckets_do_not_overlap() {
        let buckets = [
            status_names::OPEN,
            status_names::DERIVED,
            status_names::REJECTED,
            status_names::FINISHED,
        ];
        for (i, a) in buckets.iter().enumerate() {
            for b in buckets.iter().skip(i + 1) {
                assert!(a.iter().all(|name| !b.contains(name)));
            }
        }
        assert!(status_names::OPEN.contains(&status_names::CREATED));
    }
}
