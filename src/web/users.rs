use crate::db::{self, DeleteOutcome, NewUser, SelectOption, UserRow, UserSummary, UserUpdate};
use crate::domain::access::Permission;
use crate::domain::models::Role;
use crate::password;
use crate::state::SharedState;
use crate::web::error::{ActionError, NO_PROFILE};
use crate::web::form::{optional_text, FormErrors, INVALID_CHOICE};
use crate::web::notice::{redirect_with, Flash, Notice, Page};
use crate::web::session::Caller;
use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateUserForm {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub password1: String,
    pub password2: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EditUserForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
}

#[derive(Serialize)]
pub struct UserList {
    pub summary: UserSummary,
    pub users: Vec<UserRow>,
}

#[derive(Serialize)]
pub struct UserFormData {
    pub user: Option<UserRow>,
    pub roles: Vec<SelectOption>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/usuarios", get(list))
        .route("/usuarios/bloqueados", get(list_blocked))
        .route("/usuarios/crear", get(create_form).post(create))
        .route("/usuarios/:id", get(view))
        .route("/usuarios/:id/editar", get(edit_form).post(edit))
        .route("/usuarios/:id/bloquear", post(block))
        .route("/usuarios/:id/desbloquear", post(unblock))
        .route("/usuarios/:id/eliminar", post(delete))
        .with_state(state)
}

fn role_options() -> Vec<SelectOption> {
    Role::ALL
        .into_iter()
        .map(|role| SelectOption {
            id: role.id(),
            label: role.group_name().to_string(),
        })
        .collect()
}

fn parse_role(errors: &mut FormErrors, raw: &str) -> Option<Role> {
    let id = errors.id("role", raw)?;
    match Role::try_from(id) {
        Ok(role) => Some(role),
        Err(_) => {
            errors.add("role", INVALID_CHOICE);
            None
        }
    }
}

/// Names and email are required on both user forms.
#[derive(Debug)]
struct PersonalData<'a> {
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
}

fn personal_data<'a>(
    errors: &mut FormErrors,
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
) -> Option<PersonalData<'a>> {
    let first_name = errors.text("first_name", first_name);
    let last_name = errors.text("last_name", last_name);
    let email = errors.email("email", email);
    Some(PersonalData {
        first_name: first_name?,
        last_name: last_name?,
        email: email?,
    })
}

impl CreateUserForm {
    fn validate(&self) -> Result<(&str, Role, PersonalData<'_>), FormErrors> {
        let mut errors = FormErrors::default();
        let username = errors.text("username", &self.username);
        let personal = personal_data(&mut errors, &self.first_name, &self.last_name, &self.email);
        let role = parse_role(&mut errors, &self.role);

        if self.password1.chars().count() < password::MIN_LENGTH {
            errors.add(
                "password1",
                format!("La contraseña debe tener al menos {} caracteres.", password::MIN_LENGTH),
            );
        }
        if self.password1 != self.password2 {
            errors.add("password2", "Las contraseñas no coinciden.");
        }

        match (username, role, personal) {
            (Some(username), Some(role), Some(personal)) if errors.is_empty() => {
                Ok((username, role, personal))
            }
            _ => Err(errors),
        }
    }
}

impl EditUserForm {
    fn validate(&self) -> Result<UserUpdate<'_>, FormErrors> {
        let mut errors = FormErrors::default();
        let personal = personal_data(&mut errors, &self.first_name, &self.last_name, &self.email);
        let role = parse_role(&mut errors, &self.role);

        match (role, personal) {
            (Some(role), Some(personal)) if errors.is_empty() => Ok(UserUpdate {
                first_name: personal.first_name,
                last_name: personal.last_name,
                email: personal.email,
                phone: optional_text(&self.phone),
                role,
            }),
            _ => Err(errors),
        }
    }
}

async fn list(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<UserList>, ActionError> {
    caller.require(Permission::ManageUsers)?;
    let summary = db::user_summary(&state.pool).await?;
    let users = db::list_users(&state.pool, true).await?;
    Ok(flash.page(UserList { summary, users }))
}

async fn list_blocked(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<Vec<UserRow>>, ActionError> {
    caller.require(Permission::ManageUsers)?;
    Ok(flash.page(db::list_users(&state.pool, false).await?))
}

async fn create_form(caller: Caller, flash: Flash) -> Result<Page<UserFormData>, ActionError> {
    caller.require(Permission::ManageUsers)?;
    Ok(flash.page(UserFormData {
        user: None,
        roles: role_options(),
    }))
}

async fn create(
    State(state): State<SharedState>,
    caller: Caller,
    Form(form): Form<CreateUserForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageUsers)?;
    let (username, role, personal) = form.validate()?;

    if db::username_taken(&state.pool, username).await? {
        let mut errors = FormErrors::default();
        errors.add("username", "Ya existe un usuario con ese nombre.");
        return Err(errors.into());
    }

    let hash = password::hash_password(&form.password1)?;
    let id = db::create_user(
        &state.pool,
        &NewUser {
            username,
            first_name: personal.first_name,
            last_name: personal.last_name,
            email: personal.email,
            phone: optional_text(&form.phone),
            role,
            password_hash: &hash,
        },
    )
    .await?;

    tracing::info!("User {} created user {} ({:?})", caller.user_id, id, role);
    Ok(redirect_with("/usuarios", Notice::success("Usuario creado con éxito.")))
}

async fn view(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(id): Path<i32>,
) -> Result<Page<UserRow>, ActionError> {
    caller.require(Permission::ManageUsers)?;
    let user = db::get_user_row(&state.pool, id)
        .await?
        .ok_or(ActionError::NotFound)?;

    let missing_profile = user.group_id.is_none();
    let page = flash.page(user);
    if missing_profile {
        return Ok(page.with_notice(Notice::warning(NO_PROFILE)));
    }
    Ok(page)
}

async fn edit_form(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
    Path(id): Path<i32>,
) -> Result<Page<UserFormData>, ActionError> {
    caller.require(Permission::ManageUsers)?;
    let user = db::get_user_row(&state.pool, id)
        .await?
        .ok_or(ActionError::NotFound)?;
    Ok(flash.page(UserFormData {
        user: Some(user),
        roles: role_options(),
    }))
}

async fn edit(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
    Form(form): Form<EditUserForm>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageUsers)?;
    let update = form.validate()?;

    if !db::update_user(&state.pool, id, &update).await? {
        return Err(ActionError::NotFound);
    }

    tracing::info!("User {} updated user {}", caller.user_id, id);
    Ok(redirect_with(
        &format!("/usuarios/{id}"),
        Notice::success("Usuario actualizado con éxito."),
    ))
}

async fn block(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageUsers)?;
    if id == caller.user_id {
        return Err(ActionError::rejected("/usuarios", "No puedes bloquear tu propia cuenta."));
    }
    if !db::set_user_active(&state.pool, id, false).await? {
        return Err(ActionError::NotFound);
    }
    tracing::info!("User {} blocked user {}", caller.user_id, id);
    Ok(redirect_with("/usuarios", Notice::success("Usuario bloqueado.")))
}

async fn unblock(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageUsers)?;
    if !db::set_user_active(&state.pool, id, true).await? {
        return Err(ActionError::NotFound);
    }
    tracing::info!("User {} unblocked user {}", caller.user_id, id);
    Ok(redirect_with("/usuarios/bloqueados", Notice::success("Usuario desbloqueado.")))
}

async fn delete(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> Result<Response, ActionError> {
    caller.require(Permission::ManageUsers)?;
    if id == caller.user_id {
        return Err(ActionError::rejected("/usuarios", "No puedes eliminar tu propia cuenta."));
    }

    match db::delete_user(&state.pool, id).await? {
        DeleteOutcome::Deleted => {
            tracing::info!("User {} deleted user {}", caller.user_id, id);
            Ok(redirect_with("/usuarios", Notice::success("Usuario eliminado.")))
        }
        DeleteOutcome::NotFound => Err(ActionError::NotFound),
        DeleteOutcome::Protected(crews) => Err(ActionError::rejected(
            "/usuarios",
            format!("No se puede eliminar: el usuario lidera {crews} cuadrilla(s)."),
        )),
    }
}
