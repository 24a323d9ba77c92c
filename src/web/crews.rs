use crate::db::crews::{self, CrewRow};
use crate::db::lifecycle::is_active;
use crate::db::organization;
use crate::db::{self, SelectOption};
use crate::domain::access::Permission;
use crate::domain::lifecycle::{Stateful, Transition};
use crate::domain::models::{EntityState, Role};
use crate::state::SharedState;
use crate::web::error::{written, ActionError};
use crate::web::form::FormErrors;
use crate::web::lifecycle::{remove, toggle};
use crate::web::notice::{redirect_with, Flash, Notice, Page};
use crate::web::organization::SearchQuery;
use crate::web::session::Caller;
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};

const REFERENCE_MISSING: &str = "El departamento o el líder seleccionado ya no existe.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CrewForm {
    pub name: String,
    pub department_id: String,
    pub leader_id: String,
}

impl CrewForm {
    fn validate(&self) -> Result<(&str, i32, i32), FormErrors> {
        let mut errors = FormErrors::default();
        let name = errors.text("name", &self.name);
        let department_id = errors.id("department_id", &self.department_id);
        let leader_id = errors.id("leader_id", &self.leader_id);
        match (name, department_id, leader_id) {
            (Some(name), Some(department_id), Some(leader_id)) => Ok((name, department_id, leader_id)),
            _ => Err(errors),
        }
    }
}

/// The department must be active and the leader an active Cuadrilla user,
/// the same rows the form offers.
async fn check_choices(state: &SharedState, department_id: i32, leader_id: i32) -> Result<(), ActionError> {
    let mut errors = FormErrors::default();
    errors.choice(
        "department_id",
        is_active(&state.pool, Stateful::Department, department_id).await?,
    );
    errors.choice(
        "leader_id",
        db::user_in_role(&state.pool, leader_id, Role::Cuadrilla).await?,
    );
    errors.into_result()?;
    Ok(())
}

#[derive(Serialize)]
pub struct CrewList {
    pub search: Option<String>,
    pub total_active_crews: i64,
    pub crews: Vec<CrewRow>,
}

#[derive(Serialize)]
pub struct CrewFormData {
    pub crew: Option<CrewRow>,
    pub departments: Vec<SelectOption>,
    pub leaders: Vec<SelectOption>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/cuadrillas", get(list))
        .route("/cuadrillas/bloqueados", get(list_blocked))
        .route("/cuadrillas/crear", get(create_form).post(create))
        .route("/cuadrillas/:id", get(view))
        .route("/cuadrillas/:id/editar", get(edit_form).post(edit))
        .route("/cuadrillas/:id/bloquear", post(block))
        .route("/cuadrillas/:id/desbloquear", post(unblock))
        .route("/cuadrillas/:id/eliminar", post(delete))
        .with_state(state)
}

async fn form_data(state: &SharedState, crew: Option<CrewRow>) -> Result<CrewFormData, ActionError> {
    Ok(CrewFormData {
        crew,
        departments: organization::department_options(&state.pool).await?,
        leaders: db::users_in_role(&state.pool, Role::Cuadrilla).await?,
    })
}

async fn list(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Query(query): Query<SearchQuery>,
) -> Result<Page<CrewList>, ActionError> {
    caller.require(Permission::ManageCrews)?;
    let crews = crews::list_crews(&state.pool, EntityState::Activo, query.q.as_deref()).await?;
    let total_active_crews = crews::count_crews(&state.pool, EntityState::Activo).await?;
    Ok(flash.page(CrewList {
        search: query.q,
        total_active_crews,
        crews,
    }))
}

async fn list_blocked(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<Vec<CrewRow>>, ActionError> {
    caller.require(Permission::ManageCrews)?;
    Ok(flash.page(crews::list_crews(&state.pool, EntityState::Bloqueado, None).await?))
}

async fn create_form(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<CrewFormData>, ActionError> {
    caller.require(Permission::ManageCrews)?;
    Ok(flash.page(form_data(&state, None).await?))
}

async fn create(
    State(state): State<SharedState>,
    caller: Caller,
    Form(form): Form<CrewForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageCrews)?;
    let (name, department_id, leader_id) = form.validate()?;
    check_choices(&state, department_id, leader_id).await?;

    let outcome = crews::create_crew(&state.pool, name, department_id, leader_id).await?;
    let id = written(outcome, "/cuadrillas/crear", REFERENCE_MISSING)?;

    tracing::info!("User {} created crew {} led by {}", caller.user_id, id, leader_id);
    Ok(redirect_with("/cuadrillas", Notice::success("Cuadrilla creada con éxito.")))
}

async fn view(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(id): Path<i32>,
) -> Result<Page<CrewRow>, ActionError> {
    caller.require(Permission::ManageCrews)?;
    let crew = crews::get_crew(&state.pool, id)
        .await?
        .ok_or(ActionError::NotFound)?;
    Ok(flash.page(crew))
}

async fn edit_form(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(id): Path<i32>,
) -> Result<Page<CrewFormData>, ActionError> {
    caller.require(Permission::ManageCrews)?;
    let crew = crews::get_crew(&state.pool, id)
        .await?
        .ok_or(ActionError::NotFound)?;
    Ok(flash.page(form_data(&state, Some(crew)).await?))
}

async fn edit(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
    Form(form): Form<CrewForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageCrews)?;
    let (name, department_id, leader_id) = form.validate()?;
    check_choices(&state, department_id, leader_id).await?;

    let outcome = crews::update_crew(&state.pool, id, name, department_id, leader_id).await?;
    written(outcome, &format!("/cuadrillas/{id}/editar"), REFERENCE_MISSING)?;

    tracing::info!("User {} updated crew {}", caller.user_id, id);
    Ok(redirect_with(
        &format!("/cuadrillas/{id}"),
        Notice::success("Cuadrilla actualizada con éxito."),
    ))
}

async fn block(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    toggle(&state, &caller, Stateful::Crew, id, Transition::Block, "/cuadrillas").await
}

async fn unblock(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    toggle(&state, &caller, Stateful::Crew, id, Transition::Unblock, "/cuadrillas/bloqueados").await
}

/// Requests assigned to the crew keep existing with no crew.
async fn delete(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    remove(&state, &caller, Stateful::Crew, id, "/cuadrillas").await
}
