use crate::db::dashboard::{self, Dashboard};
use crate::domain::access::Permission;
use crate::state::SharedState;
use crate::web::error::ActionError;
use crate::web::notice::{redirect, Flash, Page};
use crate::web::session::Caller;
use axum::{extract::State, response::Response, routing::get, Router};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/panel", get(panel))
        .with_state(state)
}

/// Sends each role to its home page.
async fn landing(caller: Caller) -> Response {
    redirect(caller.role.landing_path())
}

async fn panel(
    State(state): State<SharedState>,
    caller: Caller,
    flash: Flash,
) -> Result<Page<Dashboard>, ActionError> {
    caller.require(Permission::ViewDashboard)?;
    Ok(flash.page(dashboard::load(&state.pool).await?))
}
