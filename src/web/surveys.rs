//! Survey types, surveys and questions.

use crate::db::lifecycle::is_active;
use crate::db::organization;
use crate::db::surveys::{self, Question, SurveyFields, SurveyRow, SurveyType};
use crate::db::{SelectOption, WriteOutcome};
use crate::domain::access::Permission;
use crate::domain::lifecycle::{Stateful, Transition};
use crate::domain::models::EntityState;
use crate::state::SharedState;
use crate::web::error::{written, ActionError};
use crate::web::form::FormErrors;
use crate::web::lifecycle::{remove, toggle};
use crate::web::notice::{redirect_with, Flash, Notice, Page};
use crate::web::session::Caller;
use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};

const INVALID_REFERENCES: &str = "Departamento o tipo de encuesta no válido";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SurveyTypeForm {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SurveyForm {
    pub title: String,
    pub description: String,
    pub department_id: String,
    pub survey_type_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QuestionForm {
    pub text: String,
}

impl SurveyForm {
    /// A blank title is a field error; a bad department or type rejects the
    /// whole form with a notice.
    fn validate(&self, back: &str) -> Result<SurveyFields<'_>, ActionError> {
        let mut errors = FormErrors::default();
        let title = errors.text("title", &self.title);
        let Some(title) = title else {
            return Err(errors.into());
        };

        let mut references = FormErrors::default();
        let department_id = references.id("department_id", &self.department_id);
        let survey_type_id = references.id("survey_type_id", &self.survey_type_id);
        let (Some(department_id), Some(survey_type_id)) = (department_id, survey_type_id) else {
            return Err(ActionError::rejected(back, INVALID_REFERENCES));
        };

        Ok(SurveyFields {
            title,
            description: self.description.trim(),
            department_id,
            survey_type_id,
        })
    }
}

/// Only active departments and types are offered on the form.
async fn check_references(state: &SharedState, fields: &SurveyFields<'_>, back: &str) -> Result<(), ActionError> {
    let offered = is_active(&state.pool, Stateful::Department, fields.department_id).await?
        && is_active(&state.pool, Stateful::SurveyType, fields.survey_type_id).await?;
    if !offered {
        return Err(ActionError::rejected(back, INVALID_REFERENCES));
    }
    Ok(())
}

#[derive(Serialize)]
pub struct SurveyFormData {
    pub survey: Option<SurveyRow>,
    pub departments: Vec<SelectOption>,
    pub survey_types: Vec<SelectOption>,
}

#[derive(Serialize)]
pub struct SurveyDetail {
    pub survey: SurveyRow,
    pub questions: Vec<Question>,
}

#[derive(Serialize)]
pub struct QuestionList {
    pub survey: SurveyRow,
    pub questions: Vec<Question>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/tipos-encuesta", get(list_types))
        .route("/tipos-encuesta/bloqueados", get(blocked_types))
        .route("/tipos-encuesta/crear", get(type_create_form).post(create_type))
        .route("/tipos-encuesta/:id/editar", get(type_edit_form).post(edit_type))
        .route("/tipos-encuesta/:id/bloquear", post(block_type))
        .route("/tipos-encuesta/:id/desbloquear", post(unblock_type))
        .route("/tipos-encuesta/:id/eliminar", post(delete_type))
        .route("/encuestas", get(list_surveys))
        .route("/encuestas/bloqueados", get(blocked_surveys))
        .route("/encuestas/crear", get(survey_create_form).post(create_survey))
        .route("/encuestas/:id", get(view_survey))
        .route("/encuestas/:id/editar", get(survey_edit_form).post(edit_survey))
        .route("/encuestas/:id/bloquear", post(block_survey))
        .route("/encuestas/:id/desbloquear", post(unblock_survey))
        .route("/encuestas/:id/eliminar", post(delete_survey))
        .route("/encuestas/:id/preguntas", get(list_questions).post(create_question))
        .route("/encuestas/:id/preguntas/bloqueadas", get(blocked_questions))
        .route("/preguntas/:id/editar", get(question_edit_form).post(edit_question))
        .route("/preguntas/:id/bloquear", post(block_question))
        .route("/preguntas/:id/desbloquear", post(unblock_question))
        .route("/preguntas/:id/eliminar", post(delete_question))
        .with_state(state)
}

// ============================================
// Survey types
// ============================================

async fn list_types(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<Vec<SurveyType>>, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    Ok(flash.page(surveys::list_survey_types(&state.pool, EntityState::Activo).await?))
}

async fn blocked_types(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<Vec<SurveyType>>, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    Ok(flash.page(surveys::list_survey_types(&state.pool, EntityState::Bloqueado).await?))
}

async fn type_create_form(caller: Caller, flash: Flash) -> Result<Page<()>, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    Ok(flash.page(()))
}

async fn create_type(
    State(state): State<SharedState>,
    caller: Caller,
    Form(form): Form<SurveyTypeForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    let mut errors = FormErrors::default();
    let Some(name) = errors.text("name", &form.name) else {
        return Err(errors.into());
    };

    let id = surveys::create_survey_type(&state.pool, name).await?;
    tracing::info!("User {} created survey type {}", caller.user_id, id);
    Ok(redirect_with(
        "/tipos-encuesta",
        Notice::success("Tipo de encuesta creado con éxito."),
    ))
}

async fn type_edit_form(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(id): Path<i32>,
) -> Result<Page<SurveyType>, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    let survey_type = surveys::get_survey_type(&state.pool, id)
        .await?
        .ok_or(ActionError::NotFound)?;
    Ok(flash.page(survey_type))
}

async fn edit_type(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
    Form(form): Form<SurveyTypeForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    let mut errors = FormErrors::default();
    let Some(name) = errors.text("name", &form.name) else {
        return Err(errors.into());
    };

    if !surveys::update_survey_type(&state.pool, id, name).await? {
        return Err(ActionError::NotFound);
    }
    tracing::info!("User {} updated survey type {}", caller.user_id, id);
    Ok(redirect_with(
        "/tipos-encuesta",
        Notice::success("Tipo de encuesta actualizado con éxito."),
    ))
}

async fn block_type(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    toggle(&state, &caller, Stateful::SurveyType, id, Transition::Block, "/tipos-encuesta").await
}

async fn unblock_type(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    toggle(
        &state,
        &caller,
        Stateful::SurveyType,
        id,
        Transition::Unblock,
        "/tipos-encuesta/bloqueados",
    )
    .await
}

async fn delete_type(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    remove(&state, &caller, Stateful::SurveyType, id, "/tipos-encuesta").await
}

// ============================================
// Surveys
// ============================================

async fn survey_form_data(
    state: &SharedState,
    survey: Option<SurveyRow>,
) -> Result<SurveyFormData, ActionError> {
    Ok(SurveyFormData {
        survey,
        departments: organization::department_options(&state.pool).await?,
        survey_types: surveys::survey_type_options(&state.pool).await?,
    })
}

async fn list_surveys(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<Vec<SurveyRow>>, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    Ok(flash.page(surveys::list_surveys(&state.pool, EntityState::Activo).await?))
}

async fn blocked_surveys(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<Vec<SurveyRow>>, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    Ok(flash.page(surveys::list_surveys(&state.pool, EntityState::Bloqueado).await?))
}

async fn survey_create_form(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<SurveyFormData>, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    Ok(flash.page(survey_form_data(&state, None).await?))
}

async fn create_survey(
    State(state): State<SharedState>,
    caller: Caller,
    Form(form): Form<SurveyForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    let back = "/encuestas/crear";
    let fields = form.validate(back)?;
    check_references(&state, &fields, back).await?;

    let outcome = surveys::create_survey(&state.pool, &fields).await?;
    let id = written(outcome, back, INVALID_REFERENCES)?;

    tracing::info!("User {} created survey {}", caller.user_id, id);
    Ok(redirect_with("/encuestas", Notice::success("Encuesta creada con éxito.")))
}

async fn view_survey(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(id): Path<i32>,
) -> Result<Page<SurveyDetail>, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    let survey = surveys::get_survey(&state.pool, id)
        .await?
        .ok_or(ActionError::NotFound)?;
    let questions = surveys::list_questions(&state.pool, id, EntityState::Activo).await?;
    Ok(flash.page(SurveyDetail { survey, questions }))
}

async fn survey_edit_form(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(id): Path<i32>,
) -> Result<Page<SurveyFormData>, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    let survey = surveys::get_survey(&state.pool, id)
        .await?
        .ok_or(ActionError::NotFound)?;
    Ok(flash.page(survey_form_data(&state, Some(survey)).await?))
}

async fn edit_survey(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
    Form(form): Form<SurveyForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    let back = format!("/encuestas/{id}/editar");
    let fields = form.validate(&back)?;
    check_references(&state, &fields, &back).await?;

    let outcome = surveys::update_survey(&state.pool, id, &fields).await?;
    written(outcome, &back, INVALID_REFERENCES)?;

    tracing::info!("User {} updated survey {}", caller.user_id, id);
    Ok(redirect_with(
        &format!("/encuestas/{id}"),
        Notice::success("Encuesta actualizada con éxito."),
    ))
}

async fn block_survey(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    toggle(&state, &caller, Stateful::Survey, id, Transition::Block, "/encuestas").await
}

async fn unblock_survey(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    toggle(&state, &caller, Stateful::Survey, id, Transition::Unblock, "/encuestas/bloqueados").await
}

async fn delete_survey(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    remove(&state, &caller, Stateful::Survey, id, "/encuestas").await
}

// ============================================
// Questions
// ============================================

async fn question_page(
    state: &SharedState,
    survey_id: i32,
    question_state: EntityState,
) -> Result<QuestionList, ActionError> {
    let survey = surveys::get_survey(&state.pool, survey_id)
        .await?
        .ok_or(ActionError::NotFound)?;
    let questions = surveys::list_questions(&state.pool, survey_id, question_state).await?;
    Ok(QuestionList { survey, questions })
}

async fn list_questions(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(survey_id): Path<i32>,
) -> Result<Page<QuestionList>, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    Ok(flash.page(question_page(&state, survey_id, EntityState::Activo).await?))
}

async fn blocked_questions(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(survey_id): Path<i32>,
) -> Result<Page<QuestionList>, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    Ok(flash.page(question_page(&state, survey_id, EntityState::Bloqueado).await?))
}

fn question_text(form: &QuestionForm) -> Result<&str, ActionError> {
    let mut errors = FormErrors::default();
    errors.text("text", &form.text).ok_or_else(|| errors.into())
}

async fn create_question(
    State(state): State<SharedState>,
    caller: Caller,
    Path(survey_id): Path<i32>,
    Form(form): Form<QuestionForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    let text = question_text(&form)?;

    let id = match surveys::create_question(&state.pool, survey_id, text).await? {
        WriteOutcome::Written(id) => id,
        WriteOutcome::NotFound | WriteOutcome::MissingReference => return Err(ActionError::NotFound),
    };

    tracing::info!("User {} added question {} to survey {}", caller.user_id, id, survey_id);
    Ok(redirect_with(
        &format!("/encuestas/{survey_id}/preguntas"),
        Notice::success("Pregunta creada con éxito."),
    ))
}

async fn find_question(state: &SharedState, id: i32) -> Result<Question, ActionError> {
    surveys::get_question(&state.pool, id)
        .await?
        .ok_or(ActionError::NotFound)
}

async fn question_edit_form(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(id): Path<i32>,
) -> Result<Page<Question>, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    Ok(flash.page(find_question(&state, id).await?))
}

async fn edit_question(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
    Form(form): Form<QuestionForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    let text = question_text(&form)?;
    let question = find_question(&state, id).await?;

    if !surveys::update_question(&state.pool, id, text).await? {
        return Err(ActionError::NotFound);
    }
    tracing::info!("User {} updated question {}", caller.user_id, id);
    Ok(redirect_with(
        &format!("/encuestas/{}/preguntas", question.survey_id),
        Notice::success("Pregunta actualizada con éxito."),
    ))
}

async fn block_question(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    let question = find_question(&state, id).await?;
    let back = format!("/encuestas/{}/preguntas", question.survey_id);
    toggle(&state, &caller, Stateful::Question, id, Transition::Block, &back).await
}

async fn unblock_question(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    let question = find_question(&state, id).await?;
    let back = format!("/encuestas/{}/preguntas/bloqueadas", question.survey_id);
    toggle(&state, &caller, Stateful::Question, id, Transition::Unblock, &back).await
}

async fn delete_question(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageSurveys)?;
    let question = find_question(&state, id).await?;
    let back = format!("/encuestas/{}/preguntas", question.survey_id);
    remove(&state, &caller, Stateful::Question, id, &back).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::form::REQUIRED;

    fn survey_form(department_id: &str, survey_type_id: &str) -> SurveyForm {
        SurveyForm {
            title: "Catastro de luminarias".into(),
            description: "".into(),
            department_id: department_id.into(),
            survey_type_id: survey_type_id.into(),
        }
    }

    #[test]
    fn survey_form_parses_references() {
        let form = survey_form("2", "1");
        let fields = form.validate("/encuestas/crear").unwrap();
        assert_eq!(fields.department_id, 2);
        assert_eq!(fields.survey_type_id, 1);
        assert_eq!(fields.description, "");
    }

    #[test]
    fn missing_department_or_type_rejects_with_notice() {
        let form = survey_form("", "1");
        match form.validate("/encuestas/crear") {
            Err(ActionError::Rejected { to, notice }) => {
                assert_eq!(to, "/encuestas/crear");
                assert_eq!(notice.text, INVALID_REFERENCES);
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn blank_title_is_a_field_error() {
        let mut form = survey_form("2", "1");
        form.title = " ".into();
        match form.validate("/encuestas/crear") {
            Err(ActionError::Invalid(errors)) => assert_eq!(errors.get("title"), Some(REQUIRED)),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn question_text_is_required() {
        let form = QuestionForm { text: "\n".into() };
        assert!(matches!(question_text(&form), Err(ActionError::Invalid(_))));
    }
}
