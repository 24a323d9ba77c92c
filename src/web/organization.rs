//! Directions and departments.

use crate::db::crews::{self, CrewRow};
use crate::db::lifecycle::is_active;
use crate::db::organization::{self, DepartmentRow, DirectionRow};
use crate::db::{self, SelectOption};
use crate::domain::access::Permission;
use crate::domain::lifecycle::{Stateful, Transition};
use crate::domain::models::{EntityState, Role};
use crate::state::SharedState;
use crate::web::error::{written, ActionError};
use crate::web::form::FormErrors;
use crate::web::lifecycle::{remove, toggle};
use crate::web::notice::{redirect_with, Flash, Notice, Page};
use crate::web::session::Caller;
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};

const OWNER_MISSING: &str = "El encargado seleccionado ya no existe.";
const DIRECTION_MISSING: &str = "La dirección seleccionada ya no existe.";

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DirectionForm {
    pub name: String,
    pub owner_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DepartmentForm {
    pub name: String,
    pub direction_id: String,
    pub owner_id: String,
}

impl DirectionForm {
    fn validate(&self) -> Result<(&str, i32), FormErrors> {
        let mut errors = FormErrors::default();
        let name = errors.text("name", &self.name);
        let owner_id = errors.id("owner_id", &self.owner_id);
        match (name, owner_id) {
            (Some(name), Some(owner_id)) => Ok((name, owner_id)),
            _ => Err(errors),
        }
    }
}

impl DepartmentForm {
    fn validate(&self) -> Result<(&str, i32, i32), FormErrors> {
        let mut errors = FormErrors::default();
        let name = errors.text("name", &self.name);
        let direction_id = errors.id("direction_id", &self.direction_id);
        let owner_id = errors.id("owner_id", &self.owner_id);
        match (name, direction_id, owner_id) {
            (Some(name), Some(direction_id), Some(owner_id)) => Ok((name, direction_id, owner_id)),
            _ => Err(errors),
        }
    }
}

#[derive(Serialize)]
pub struct DirectionList {
    pub search: Option<String>,
    pub total_active_departments: i64,
    pub directions: Vec<DirectionRow>,
}

#[derive(Serialize)]
pub struct DirectionDetail {
    pub direction: DirectionRow,
    pub departments: Vec<DepartmentRow>,
}

#[derive(Serialize)]
pub struct DirectionFormData {
    pub direction: Option<DirectionRow>,
    pub owners: Vec<SelectOption>,
}

#[derive(Serialize)]
pub struct DepartmentList {
    pub search: Option<String>,
    pub total_active_crews: i64,
    pub departments: Vec<DepartmentRow>,
}

#[derive(Serialize)]
pub struct DepartmentDetail {
    pub department: DepartmentRow,
    pub crews: Vec<CrewRow>,
}

#[derive(Serialize)]
pub struct DepartmentFormData {
    pub department: Option<DepartmentRow>,
    pub directions: Vec<SelectOption>,
    pub owners: Vec<SelectOption>,
}

/// Owners must be active users of the group the form lists them from.
async fn check_owner(state: &SharedState, owner_id: i32, role: Role) -> Result<(), ActionError> {
    let mut errors = FormErrors::default();
    errors.choice("owner_id", db::user_in_role(&state.pool, owner_id, role).await?);
    errors.into_result()?;
    Ok(())
}

async fn check_department_choices(state: &SharedState, direction_id: i32, owner_id: i32) -> Result<(), ActionError> {
    let mut errors = FormErrors::default();
    errors.choice(
        "direction_id",
        is_active(&state.pool, Stateful::Direction, direction_id).await?,
    );
    errors.choice(
        "owner_id",
        db::user_in_role(&state.pool, owner_id, Role::Departamento).await?,
    );
    errors.into_result()?;
    Ok(())
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/direcciones", get(list_directions))
        .route("/direcciones/bloqueados", get(blocked_directions))
        .route("/direcciones/crear", get(direction_create_form).post(create_direction))
        .route("/direcciones/:id", get(view_direction))
        .route("/direcciones/:id/editar", get(direction_edit_form).post(edit_direction))
        .route("/direcciones/:id/bloquear", post(block_direction))
        .route("/direcciones/:id/desbloquear", post(unblock_direction))
        .route("/direcciones/:id/eliminar", post(delete_direction))
        .route("/departamentos", get(list_departments))
        .route("/departamentos/bloqueados", get(blocked_departments))
        .route("/departamentos/crear", get(department_create_form).post(create_department))
        .route("/departamentos/:id", get(view_department))
        .route("/departamentos/:id/editar", get(department_edit_form).post(edit_department))
        .route("/departamentos/:id/bloquear", post(block_department))
        .route("/departamentos/:id/desbloquear", post(unblock_department))
        .route("/departamentos/:id/eliminar", post(delete_department))
        .with_state(state)
}

// ============================================
// Directions
// ============================================

async fn list_directions(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Query(query): Query<SearchQuery>,
) -> Result<Page<DirectionList>, ActionError> {
    caller.require(Permission::ManageOrganization)?;
    let directions =
        organization::list_directions(&state.pool, EntityState::Activo, query.q.as_deref()).await?;
    let total_active_departments =
        organization::count_departments(&state.pool, EntityState::Activo).await?;
    Ok(flash.page(DirectionList {
        search: query.q,
        total_active_departments,
        directions,
    }))
}

async fn blocked_directions(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<Vec<DirectionRow>>, ActionError> {
    caller.require(Permission::ManageOrganization)?;
    let rows = organization::list_directions(&state.pool, EntityState::Bloqueado, None).await?;
    Ok(flash.page(rows))
}

async fn direction_create_form(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<DirectionFormData>, ActionError> {
    caller.require(Permission::ManageOrganization)?;
    Ok(flash.page(DirectionFormData {
        direction: None,
        owners: db::users_in_role(&state.pool, Role::Direccion).await?,
    }))
}

async fn create_direction(
    State(state): State<SharedState>,
    caller: Caller,
    Form(form): Form<DirectionForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageOrganization)?;
    let (name, owner_id) = form.validate()?;
    check_owner(&state, owner_id, Role::Direccion).await?;

    let outcome = organization::create_direction(&state.pool, name, owner_id).await?;
    let id = written(outcome, "/direcciones/crear", OWNER_MISSING)?;

    tracing::info!("User {} created direction {}", caller.user_id, id);
    Ok(redirect_with("/direcciones", Notice::success("Dirección creada con éxito.")))
}

async fn view_direction(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(id): Path<i32>,
) -> Result<Page<DirectionDetail>, ActionError> {
    caller.require(Permission::ManageOrganization)?;
    let direction = organization::get_direction(&state.pool, id)
        .await?
        .ok_or(ActionError::NotFound)?;
    let departments = organization::departments_of_direction(&state.pool, id).await?;
    Ok(flash.page(DirectionDetail {
        direction,
        departments,
    }))
}

async fn direction_edit_form(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(id): Path<i32>,
) -> Result<Page<DirectionFormData>, ActionError> {
    caller.require(Permission::ManageOrganization)?;
    let direction = organization::get_direction(&state.pool, id)
        .await?
        .ok_or(ActionError::NotFound)?;
    Ok(flash.page(DirectionFormData {
        direction: Some(direction),
        owners: db::users_in_role(&state.pool, Role::Direccion).await?,
    }))
}

async fn edit_direction(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
    Form(form): Form<DirectionForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageOrganization)?;
    let (name, owner_id) = form.validate()?;
    check_owner(&state, owner_id, Role::Direccion).await?;

    let outcome = organization::update_direction(&state.pool, id, name, owner_id).await?;
    written(outcome, &format!("/direcciones/{id}/editar"), OWNER_MISSING)?;

    tracing::info!("User {} updated direction {}", caller.user_id, id);
    Ok(redirect_with(
        &format!("/direcciones/{id}"),
        Notice::success("Dirección actualizada con éxito."),
    ))
}

async fn block_direction(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    toggle(&state, &caller, Stateful::Direction, id, Transition::Block, "/direcciones").await
}

async fn unblock_direction(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    toggle(
        &state,
        &caller,
        Stateful::Direction,
        id,
        Transition::Unblock,
        "/direcciones/bloqueados",
    )
    .await
}

async fn delete_direction(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    remove(&state, &caller, Stateful::Direction, id, "/direcciones").await
}

// ============================================
// Departments
// ============================================

async fn list_departments(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Query(query): Query<SearchQuery>,
) -> Result<Page<DepartmentList>, ActionError> {
    caller.require(Permission::ManageOrganization)?;
    let departments =
        organization::list_departments(&state.pool, EntityState::Activo, query.q.as_deref()).await?;
    let total_active_crews = crews::count_crews(&state.pool, EntityState::Activo).await?;
    Ok(flash.page(DepartmentList {
        search: query.q,
        total_active_crews,
        departments,
    }))
}

async fn blocked_departments(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<Vec<DepartmentRow>>, ActionError> {
    caller.require(Permission::ManageOrganization)?;
    let rows = organization::list_departments(&state.pool, EntityState::Bloqueado, None).await?;
    Ok(flash.page(rows))
}

async fn department_form_data(
    state: &SharedState,
    department: Option<DepartmentRow>,
) -> Result<DepartmentFormData, ActionError> {
    Ok(DepartmentFormData {
        department,
        directions: organization::direction_options(&state.pool).await?,
        owners: db::users_in_role(&state.pool, Role::Departamento).await?,
    })
}

async fn department_create_form(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<DepartmentFormData>, ActionError> {
    caller.require(Permission::ManageOrganization)?;
    Ok(flash.page(department_form_data(&state, None).await?))
}

async fn create_department(
    State(state): State<SharedState>,
    caller: Caller,
    Form(form): Form<DepartmentForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageOrganization)?;
    let (name, direction_id, owner_id) = form.validate()?;
    check_department_choices(&state, direction_id, owner_id).await?;

    let outcome =
        organization::create_department(&state.pool, name, direction_id, owner_id).await?;
    let id = written(
        outcome,
        "/departamentos/crear",
        &format!("{DIRECTION_MISSING} {OWNER_MISSING}"),
    )?;

    tracing::info!("User {} created department {}", caller.user_id, id);
    Ok(redirect_with("/departamentos", Notice::success("Departamento creado con éxito.")))
}

async fn view_department(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(id): Path<i32>,
) -> Result<Page<DepartmentDetail>, ActionError> {
    caller.require(Permission::ManageOrganization)?;
    let department = organization::get_department(&state.pool, id)
        .await?
        .ok_or(ActionError::NotFound)?;
    let crews = crews::crews_of_department(&state.pool, id).await?;
    Ok(flash.page(DepartmentDetail { department, crews }))
}

async fn department_edit_form(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(id): Path<i32>,
) -> Result<Page<DepartmentFormData>, ActionError> {
    caller.require(Permission::ManageOrganization)?;
    let department = organization::get_department(&state.pool, id)
        .await?
        .ok_or(ActionError::NotFound)?;
    Ok(flash.page(department_form_data(&state, Some(department)).await?))
}

async fn edit_department(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
    Form(form): Form<DepartmentForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageOrganization)?;
    let (name, direction_id, owner_id) = form.validate()?;
    check_department_choices(&state, direction_id, owner_id).await?;

    let outcome =
        organization::update_department(&state.pool, id, name, direction_id, owner_id).await?;
    written(
        outcome,
        &format!("/departamentos/{id}/editar"),
        &format!("{DIRECTION_MISSING} {OWNER_MISSING}"),
    )?;

    tracing::info!("User {} updated department {}", caller.user_id, id);
    Ok(redirect_with(
        &format!("/departamentos/{id}"),
        Notice::success("Departamento actualizado con éxito."),
    ))
}

async fn block_department(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    toggle(&state, &caller, Stateful::Department, id, Transition::Block, "/departamentos").await
}

async fn unblock_department(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    toggle(
        &state,
        &caller,
        Stateful::Department,
        id,
        Transition::Unblock,
        "/departamentos/bloqueados",
    )
    .await
}

async fn delete_department(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    remove(&state, &caller, Stateful::Department, id, "/departamentos").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_form_requires_name_and_owner() {
        let form = DirectionForm {
            name: "  ".into(),
            owner_id: "".into(),
        };
        let errors = form.validate().unwrap_err();
        assert!(errors.get("name").is_some());
        assert!(errors.get("owner_id").is_some());

        let form = DirectionForm {
            name: " Dirección de Obras ".into(),
            owner_id: "3".into(),
        };
        assert_eq!(form.validate().unwrap(), ("Dirección de Obras", 3));
    }

    #[test]
    fn department_form_rejects_bad_direction_id() {
        let form = DepartmentForm {
            name: "Aseo".into(),
            direction_id: "abc".into(),
            owner_id: "2".into(),
        };
        let errors = form.validate().unwrap_err();
        assert!(errors.get("direction_id").is_some());
        assert!(errors.get("owner_id").is_none());
    }
}
