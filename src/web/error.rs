use super::form::FormErrors;
use super::notice::{redirect_with, Notice};
use crate::db::WriteOutcome;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub const FORBIDDEN: &str = "No tienes permiso para realizar esta acción.";
pub const NO_PROFILE: &str =
    "Hubo un error con su usuario, por favor contactese con los administradores";
const NOT_LOGGED_IN: &str = "Debe iniciar sesión para continuar.";
const STORE_FAILURE: &str = "Ocurrió un error inesperado. Intente nuevamente.";

/// Every way a handler can end other than success.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("user has no profile")]
    NoProfile,
    #[error("profile has unknown role {0}")]
    UnknownRole(i32),
    #[error("forbidden")]
    Forbidden { landing: &'static str },
    #[error("not found")]
    NotFound,
    #[error("invalid form")]
    Invalid(FormErrors),
    #[error("rejected: {}", .notice.text)]
    Rejected { to: String, notice: Notice },
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl ActionError {
    pub fn rejected(to: impl Into<String>, text: impl Into<String>) -> Self {
        ActionError::Rejected {
            to: to.into(),
            notice: Notice::error(text),
        }
    }
}

/// Unwraps a write, turning a vanished reference into a rejection back to `back`.
pub fn written(outcome: WriteOutcome, back: &str, missing: &str) -> Result<i32, ActionError> {
    match outcome {
        WriteOutcome::Written(id) => Ok(id),
        WriteOutcome::NotFound => Err(ActionError::NotFound),
        WriteOutcome::MissingReference => Err(ActionError::rejected(back, missing)),
    }
}

impl From<FormErrors> for ActionError {
    fn from(errors: FormErrors) -> Self {
        ActionError::Invalid(errors)
    }
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        match self {
            ActionError::NotLoggedIn => redirect_with("/login", Notice::info(NOT_LOGGED_IN)),
            ActionError::NoProfile => redirect_with("/login", Notice::error(NO_PROFILE)),
            ActionError::UnknownRole(id) => {
                tracing::warn!("Profile carries unknown role id {}", id);
                redirect_with("/login", Notice::error(NO_PROFILE))
            }
            ActionError::Forbidden { landing } => redirect_with(landing, Notice::error(FORBIDDEN)),
            ActionError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "No encontrado" })),
            )
                .into_response(),
            ActionError::Invalid(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "errors": errors })),
            )
                .into_response(),
            ActionError::Rejected { to, notice } => redirect_with(&to, notice),
            ActionError::Store(e) => {
                tracing::error!("Store failure: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "notice": Notice::error(STORE_FAILURE) })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn forbidden_returns_to_landing() {
        let response = ActionError::Forbidden { landing: "/solicitudes" }.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/solicitudes");
    }

    #[test]
    fn missing_profile_goes_back_to_login() {
        for error in [ActionError::NoProfile, ActionError::UnknownRole(9), ActionError::NotLoggedIn] {
            let response = error.into_response();
            assert_eq!(response.headers()[header::LOCATION], "/login");
        }
    }

    #[test]
    fn invalid_form_is_unprocessable() {
        let mut errors = FormErrors::default();
        errors.add("name", "Este campo es obligatorio.");
        let response = ActionError::from(errors).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn vanished_reference_is_rejected_with_notice() {
        assert_eq!(written(WriteOutcome::Written(4), "/x", "gone").unwrap(), 4);
        match written(WriteOutcome::MissingReference, "/cuadrillas/crear", "gone") {
            Err(ActionError::Rejected { to, notice }) => {
                assert_eq!(to, "/cuadrillas/crear");
                assert_eq!(notice.text, "gone");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            written(WriteOutcome::NotFound, "/x", "gone"),
            Err(ActionError::NotFound)
        ));
    }

    #[test]
    fn store_failures_are_not_redirects() {
        let response = ActionError::from(anyhow::anyhow!("connection reset")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::LOCATION).is_none());
    }
}
