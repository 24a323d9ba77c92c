//! Requests (solicitudes), their answers and multimedia attachments.

use crate::db::crews;
use crate::db::lifecycle::is_active;
use crate::db::requests::{self, AnswerRow, MediaRow, RequestFields, RequestRow, RequestStatus};
use crate::db::surveys::{self, Question};
use crate::db::{self, SelectOption, WriteOutcome};
use crate::domain::access::{may_attach_media, Permission, RequestScope};
use crate::domain::lifecycle::{Stateful, Transition};
use crate::domain::models::{status_names, EntityState, MediaKind, MediaOwner, Priority, Role};
use crate::state::SharedState;
use crate::storage::StorageError;
use crate::web::error::{written, ActionError};
use crate::web::form::{optional_text, FormErrors, INVALID_CHOICE, REQUIRED};
use crate::web::lifecycle::{remove, toggle};
use crate::web::notice::{redirect_with, Flash, Notice, Page};
use crate::web::session::Caller;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    response::Response,
    routing::{get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "Sin título";
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const REFERENCE_MISSING: &str =
    "La encuesta, cuadrilla, estado o territorial seleccionado ya no existe.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RequestForm {
    pub survey_id: String,
    pub territorial_id: String,
    pub crew_id: String,
    pub status_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub priority: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AnswerForm {
    pub text: String,
}

/// A validated request form whose status may still need resolving.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestDraft<'a> {
    pub survey_id: i32,
    pub territorial_id: i32,
    pub crew_id: Option<i32>,
    pub status_id: Option<i32>,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub location: Option<&'a str>,
    pub priority: Priority,
}

impl RequestForm {
    /// Territorial callers always file requests under their own name.
    fn validate(&self, caller: &Caller) -> Result<RequestDraft<'_>, FormErrors> {
        let mut errors = FormErrors::default();
        let survey_id = errors.id("survey_id", &self.survey_id);
        let territorial_id = match caller.role {
            Role::Territorial => Some(caller.user_id),
            _ => errors.id("territorial_id", &self.territorial_id),
        };
        let crew_id = errors.optional_id("crew_id", &self.crew_id);
        let status_id = errors.optional_id("status_id", &self.status_id);
        let priority = Priority::parse(&self.priority);
        if priority.is_none() {
            errors.add("priority", INVALID_CHOICE);
        }

        match (survey_id, territorial_id, priority) {
            (Some(survey_id), Some(territorial_id), Some(priority)) if errors.is_empty() => {
                Ok(RequestDraft {
                    survey_id,
                    territorial_id,
                    crew_id,
                    status_id,
                    title: optional_text(&self.title).unwrap_or(DEFAULT_TITLE),
                    description: optional_text(&self.description),
                    location: optional_text(&self.location),
                    priority,
                })
            }
            _ => Err(errors),
        }
    }
}

impl<'a> RequestDraft<'a> {
    fn with_status(&self, status_id: i32) -> RequestFields<'a> {
        RequestFields {
            survey_id: self.survey_id,
            territorial_id: self.territorial_id,
            crew_id: self.crew_id,
            status_id,
            title: self.title,
            description: self.description,
            location: self.location,
            priority: self.priority,
        }
    }

    /// Editing keeps the status explicit; only creation falls back to "Creada".
    fn require_status(&self) -> Result<RequestFields<'a>, FormErrors> {
        match self.status_id {
            Some(status_id) => Ok(self.with_status(status_id)),
            None => {
                let mut errors = FormErrors::default();
                errors.add("status_id", REQUIRED);
                Err(errors)
            }
        }
    }
}

/// Every chosen row must be one the form offers: active surveys, crews and
/// statuses, and an active user of the Territorial group.
async fn check_choices(state: &SharedState, draft: &RequestDraft<'_>) -> Result<(), ActionError> {
    let pool = &state.pool;
    let mut errors = FormErrors::default();
    errors.choice("survey_id", is_active(pool, Stateful::Survey, draft.survey_id).await?);
    errors.choice(
        "territorial_id",
        db::user_in_role(pool, draft.territorial_id, Role::Territorial).await?,
    );
    if let Some(crew_id) = draft.crew_id {
        errors.choice("crew_id", is_active(pool, Stateful::Crew, crew_id).await?);
    }
    if let Some(status_id) = draft.status_id {
        errors.choice("status_id", is_active(pool, Stateful::RequestStatus, status_id).await?);
    }
    errors.into_result()?;
    Ok(())
}

/// A missing status falls back to "Creada"; if that status is gone the
/// request is refused rather than saved without one.
async fn resolve_status(
    state: &SharedState,
    draft: &RequestDraft<'_>,
    back: &str,
) -> Result<i32, ActionError> {
    if let Some(id) = draft.status_id {
        return Ok(id);
    }
    match requests::find_status_by_name(&state.pool, status_names::CREATED).await? {
        Some(id) => Ok(id),
        None => {
            tracing::error!("Request status '{}' is missing", status_names::CREATED);
            Err(ActionError::rejected(back, "Estado 'Creada' no encontrado."))
        }
    }
}

#[derive(Serialize)]
pub struct RequestFormData {
    pub request: Option<RequestRow>,
    pub surveys: Vec<SelectOption>,
    pub crews: Vec<SelectOption>,
    pub statuses: Vec<SelectOption>,
    pub territorials: Vec<SelectOption>,
    pub priorities: [Priority; 3],
}

#[derive(Serialize)]
pub struct RequestDetail {
    pub request: RequestRow,
    pub questions: Vec<Question>,
    pub answers: Vec<AnswerRow>,
    pub current_answers: Vec<AnswerRow>,
    pub media: Vec<MediaRow>,
    pub can_attach_media: bool,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/solicitudes", get(list))
        .route("/solicitudes/bloqueados", get(list_blocked))
        .route("/solicitudes/crear", get(create_form).post(create))
        .route("/solicitudes/:id", get(view))
        .route("/solicitudes/:id/editar", get(edit_form).post(edit))
        .route("/solicitudes/:id/bloquear", post(block))
        .route("/solicitudes/:id/desbloquear", post(unblock))
        .route("/solicitudes/:id/eliminar", post(delete))
        .route("/solicitudes/:id/responder/:question_id", post(answer))
        .route("/solicitudes/:id/multimedia", post(upload_request_media))
        .route("/respuestas/:id/multimedia", post(upload_answer_media))
        .route("/estados", get(list_statuses))
        .route("/estados/bloqueados", get(blocked_statuses))
        .route("/estados/:id/bloquear", post(block_status))
        .route("/estados/:id/desbloquear", post(unblock_status))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn form_data(state: &SharedState, request: Option<RequestRow>) -> Result<RequestFormData, ActionError> {
    Ok(RequestFormData {
        request,
        surveys: surveys::survey_options(&state.pool).await?,
        crews: crews::crew_options(&state.pool).await?,
        statuses: requests::status_options(&state.pool).await?,
        territorials: db::users_in_role(&state.pool, Role::Territorial).await?,
        priorities: Priority::ALL,
    })
}

async fn find_request(state: &SharedState, id: i32) -> Result<RequestRow, ActionError> {
    requests::get_request(&state.pool, id)
        .await?
        .ok_or(ActionError::NotFound)
}

async fn list(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<Vec<RequestRow>>, ActionError> {
    caller.require(Permission::ViewRequests)?;
    let scope = RequestScope::for_caller(caller.role, caller.user_id);
    let rows = requests::list_requests(&state.pool, EntityState::Activo, scope).await?;
    Ok(flash.page(rows))
}

async fn list_blocked(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<Vec<RequestRow>>, ActionError> {
    caller.require(Permission::ModerateRequest)?;
    let rows = requests::list_requests(&state.pool, EntityState::Bloqueado, RequestScope::All).await?;
    Ok(flash.page(rows))
}

async fn create_form(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<RequestFormData>, ActionError> {
    caller.require(Permission::CreateRequest)?;
    Ok(flash.page(form_data(&state, None).await?))
}

async fn create(
    State(state): State<SharedState>,
    caller: Caller,
    Form(form): Form<RequestForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::CreateRequest)?;
    let back = "/solicitudes/crear";
    let draft = form.validate(&caller)?;
    check_choices(&state, &draft).await?;
    let status_id = resolve_status(&state, &draft, back).await?;

    let outcome = requests::create_request(&state.pool, &draft.with_status(status_id)).await?;
    let id = written(outcome, back, REFERENCE_MISSING)?;

    tracing::info!(
        "User {} created request {} (priority {:?})",
        caller.user_id,
        id,
        draft.priority
    );
    Ok(redirect_with("/solicitudes", Notice::success("Solicitud creada con éxito.")))
}

async fn view(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(id): Path<i32>,
) -> Result<Page<RequestDetail>, ActionError> {
    caller.require(Permission::ViewRequests)?;
    let request = find_request(&state, id).await?;
    let questions = surveys::list_questions(&state.pool, request.survey_id, EntityState::Activo).await?;
    let answers = requests::list_answers(&state.pool, id).await?;
    let current_answers = requests::current_answers(&state.pool, id).await?;
    let media = requests::media_of_request(&state.pool, id).await?;
    let can_attach_media = may_attach_media(caller.role, caller.user_id, request.crew_leader_id);

    Ok(flash.page(RequestDetail {
        request,
        questions,
        answers,
        current_answers,
        media,
        can_attach_media,
    }))
}

async fn edit_form(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(id): Path<i32>,
) -> Result<Page<RequestFormData>, ActionError> {
    caller.require(Permission::EditRequest)?;
    let request = find_request(&state, id).await?;
    Ok(flash.page(form_data(&state, Some(request)).await?))
}

async fn edit(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
    Form(form): Form<RequestForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::EditRequest)?;
    let back = format!("/solicitudes/{id}/editar");
    let draft = form.validate(&caller)?;
    let fields = draft.require_status()?;
    check_choices(&state, &draft).await?;

    let outcome = requests::update_request(&state.pool, id, &fields).await?;
    written(outcome, &back, REFERENCE_MISSING)?;

    tracing::info!("User {} updated request {}", caller.user_id, id);
    Ok(redirect_with(
        &format!("/solicitudes/{id}"),
        Notice::success("Solicitud actualizada con éxito."),
    ))
}

async fn block(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    toggle(&state, &caller, Stateful::Request, id, Transition::Block, "/solicitudes").await
}

async fn unblock(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    toggle(&state, &caller, Stateful::Request, id, Transition::Unblock, "/solicitudes/bloqueados").await
}

async fn delete(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    remove(&state, &caller, Stateful::Request, id, "/solicitudes").await
}

// ============================================
// Request statuses
// ============================================

async fn list_statuses(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<Vec<RequestStatus>>, ActionError> {
    caller.require(Permission::ModerateRequest)?;
    Ok(flash.page(requests::list_statuses(&state.pool, EntityState::Activo).await?))
}

async fn blocked_statuses(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<Vec<RequestStatus>>, ActionError> {
    caller.require(Permission::ModerateRequest)?;
    Ok(flash.page(requests::list_statuses(&state.pool, EntityState::Bloqueado).await?))
}

/// A blocked status stops being offered to new or edited requests; requests
/// already carrying it keep it.
async fn block_status(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    toggle(&state, &caller, Stateful::RequestStatus, id, Transition::Block, "/estados").await
}

async fn unblock_status(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    toggle(&state, &caller, Stateful::RequestStatus, id, Transition::Unblock, "/estados/bloqueados").await
}

/// Appends an answer. Earlier answers to the same question are kept; the
/// newest one is the current answer.
async fn answer(
    State(state): State<SharedState>,
    caller: Caller,
    Path((id, question_id)): Path<(i32, i32)>,
    Form(form): Form<AnswerForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::AnswerRequest)?;
    let back = format!("/solicitudes/{id}");

    let mut errors = FormErrors::default();
    let Some(text) = errors.text("text", &form.text) else {
        return Err(errors.into());
    };

    let request = find_request(&state, id).await?;
    let question = surveys::get_question(&state.pool, question_id)
        .await?
        .ok_or(ActionError::NotFound)?;
    if question.survey_id != request.survey_id {
        return Err(ActionError::rejected(
            back,
            "La pregunta no pertenece a la encuesta de esta solicitud.",
        ));
    }

    let outcome = requests::insert_answer(&state.pool, id, question_id, text).await?;
    let answer_id = written(outcome, &back, "La solicitud o la pregunta ya no existe.")?;

    tracing::info!(
        "User {} answered question {} on request {} (answer {})",
        caller.user_id,
        question_id,
        id,
        answer_id
    );
    Ok(redirect_with(&back, Notice::success("Respuesta guardada con éxito.")))
}

// ============================================
// Multimedia
// ============================================

#[derive(Debug, Default)]
struct Upload {
    file_name: String,
    bytes: Vec<u8>,
    kind: String,
    description: String,
}

impl Upload {
    fn validate(&self) -> Result<MediaKind, FormErrors> {
        let mut errors = FormErrors::default();
        if self.bytes.is_empty() {
            errors.add("archivo", REQUIRED);
        }
        let kind = MediaKind::parse(&self.kind);
        if kind.is_none() {
            errors.add("tipo", INVALID_CHOICE);
        }
        match kind {
            Some(kind) if errors.is_empty() => Ok(kind),
            _ => Err(errors),
        }
    }
}

fn unreadable_upload() -> ActionError {
    let mut errors = FormErrors::default();
    errors.add("archivo", "No se pudo leer el archivo enviado.");
    errors.into()
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ActionError> {
    let mut upload = Upload::default();
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Malformed multipart upload: {}", e);
        unreadable_upload()
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "archivo" => {
                upload.file_name = field.file_name().unwrap_or_default().to_string();
                upload.bytes = field.bytes().await.map_err(|_| unreadable_upload())?.to_vec();
            }
            "tipo" => upload.kind = field.text().await.map_err(|_| unreadable_upload())?,
            "descripcion" => upload.description = field.text().await.map_err(|_| unreadable_upload())?,
            _ => {}
        }
    }
    Ok(upload)
}

/// Writes the file, then the row. A failed insert leaves the file in place.
async fn store_media(
    state: &SharedState,
    caller: &Caller,
    owner: MediaOwner,
    upload: Upload,
    back: &str,
) -> Result<Response, ActionError> {
    let kind = upload.validate()?;

    let file_path = match state.media.save(&upload.file_name, &upload.bytes).await {
        Ok(path) => path,
        Err(StorageError::Empty) => {
            let mut errors = FormErrors::default();
            errors.add("archivo", REQUIRED);
            return Err(errors.into());
        }
        Err(e) => return Err(anyhow::Error::from(e).into()),
    };

    let outcome = requests::insert_media(
        &state.pool,
        owner,
        kind,
        &file_path,
        optional_text(&upload.description),
    )
    .await?;
    if outcome == WriteOutcome::MissingReference {
        tracing::warn!("Attachment {} stored but its owner {:?} is gone", file_path, owner);
    }
    let id = written(outcome, back, "El elemento al que se adjunta ya no existe.")?;

    tracing::info!(
        "User {} attached {} {} ({}) to {:?}",
        caller.user_id,
        kind.label(),
        id,
        file_path,
        owner
    );
    Ok(redirect_with(
        back,
        Notice::success(format!("Archivo de tipo {} adjuntado con éxito.", kind.label())),
    ))
}

async fn upload_request_media(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> Result<Response, ActionError> {
    let request = find_request(&state, id).await?;
    if !may_attach_media(caller.role, caller.user_id, request.crew_leader_id) {
        tracing::warn!("User {} may not attach media to request {}", caller.user_id, id);
        return Err(caller.forbidden());
    }

    let upload = read_upload(multipart).await?;
    store_media(&state, &caller, MediaOwner::Request(id), upload, &format!("/solicitudes/{id}")).await
}

async fn upload_answer_media(
    State(state): State<SharedState>,
    caller: Caller,
    Path(answer_id): Path<i32>,
    multipart: Multipart,
) -> Result<Response, ActionError> {
    let answer = requests::get_answer(&state.pool, answer_id)
        .await?
        .ok_or(ActionError::NotFound)?;
    let request = find_request(&state, answer.request_id).await?;
    if !may_attach_media(caller.role, caller.user_id, request.crew_leader_id) {
        tracing::warn!("User {} may not attach media to answer {}", caller.user_id, answer_id);
        return Err(caller.forbidden());
    }

    let upload = read_upload(multipart).await?;
    store_media(
        &state,
        &caller,
        MediaOwner::Answer(answer_id),
        upload,
        &format!("/solicitudes/{}", request.id),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(role: Role) -> Caller {
        Caller {
            user_id: 21,
            username: "usuario".into(),
            role,
        }
    }

    fn form() -> RequestForm {
        RequestForm {
            survey_id: "3".into(),
            territorial_id: "9".into(),
            priority: "alta".into(),
            ..Default::default()
        }
    }

    #[test]
    fn territorial_callers_file_under_their_own_name() {
        let draft = form().validate(&caller(Role::Territorial)).map(|d| d.territorial_id);
        assert_eq!(draft, Ok(21));

        let draft = form().validate(&caller(Role::Secpla)).map(|d| d.territorial_id);
        assert_eq!(draft, Ok(9));
    }

    #[test]
    fn blank_optional_fields_take_defaults() {
        let form = form();
        let draft = form.validate(&caller(Role::Secpla)).unwrap();
        assert_eq!(draft.title, DEFAULT_TITLE);
        assert_eq!(draft.status_id, None);
        assert_eq!(draft.crew_id, None);
        assert_eq!(draft.description, None);
        assert_eq!(draft.priority, Priority::Alta);

        let fields = draft.with_status(1);
        assert_eq!(fields.status_id, 1);
    }

    #[test]
    fn editing_requires_an_explicit_status() {
        let form = form();
        let draft = form.validate(&caller(Role::Secpla)).unwrap();
        let errors = draft.require_status().unwrap_err();
        assert_eq!(errors.get("status_id"), Some(REQUIRED));

        let mut form = self::form();
        form.status_id = "3".into();
        let draft = form.validate(&caller(Role::Secpla)).unwrap();
        assert_eq!(draft.require_status().unwrap().status_id, 3);
    }

    #[test]
    fn administrators_must_pick_a_territorial() {
        let mut form = form();
        form.territorial_id = String::new();
        let errors = form.validate(&caller(Role::Secpla)).unwrap_err();
        assert!(errors.get("territorial_id").is_some());
    }

    #[test]
    fn unknown_priority_is_rejected() {
        let mut form = form();
        form.priority = "urgente".into();
        let errors = form.validate(&caller(Role::Secpla)).unwrap_err();
        assert_eq!(errors.get("priority"), Some(INVALID_CHOICE));
    }

    #[test]
    fn upload_needs_a_file_and_a_kind() {
        let upload = Upload {
            kind: "foto".into(),
            ..Default::default()
        };
        let errors = upload.validate().unwrap_err();
        assert_eq!(errors.get("archivo"), Some(REQUIRED));
        assert_eq!(errors.get("tipo"), Some(INVALID_CHOICE));

        let upload = Upload {
            file_name: "bache.jpg".into(),
            bytes: vec![1, 2, 3],
            kind: "imagen".into(),
            description: String::new(),
        };
        assert_eq!(upload.validate().unwrap(), MediaKind::Imagen);
    }
}
