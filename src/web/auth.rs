use crate::db;
use crate::password;
use crate::state::SharedState;
use crate::web::error::ActionError;
use crate::web::notice::{append_cookie, redirect_with, Flash, Notice, Page};
use crate::web::session;
use axum::{
    extract::{ConnectInfo, State},
    response::Response,
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;

const BAD_CREDENTIALS: &str = "Usuario o contraseña incorrectos.";

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
        .with_state(state)
}

async fn login_page(flash: Flash) -> Page<()> {
    flash.page(())
}

async fn login(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(state): State<SharedState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, ActionError> {
    let ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !state.login_limiter.check(&ip).await {
        tracing::warn!("Login rate limit exceeded for IP: {}", ip);
        return Err(ActionError::rejected(
            "/login",
            "Demasiados intentos. Espere un minuto e intente nuevamente.",
        ));
    }

    let username = form.username.trim();
    let Some(user) = db::find_active_user_by_username(&state.pool, username).await? else {
        tracing::info!("Failed login for unknown or blocked user {}", username);
        return Err(ActionError::rejected("/login", BAD_CREDENTIALS));
    };

    let verified = password::verify_password(&form.password, &user.password_hash);
    if !verified {
        tracing::info!("Failed login for user {}", user.id);
        return Err(ActionError::rejected("/login", BAD_CREDENTIALS));
    }

    state.login_limiter.reset(&ip).await;

    let token = session::sign_session(user.id, &state.session_key)
        .map_err(|e| anyhow::anyhow!("Failed to sign session: {}", e))?;

    tracing::info!("User {} logged in", user.id);

    let mut response = redirect_with("/", Notice::success(format!("Bienvenido, {}.", user.full_name())));
    append_cookie(
        &mut response,
        &session::session_cookie(&token, state.secure_cookies),
    );
    Ok(response)
}

async fn logout() -> Response {
    let mut response = redirect_with("/login", Notice::info("Sesión cerrada."));
    append_cookie(&mut response, session::cleared_session_cookie());
    response
}
