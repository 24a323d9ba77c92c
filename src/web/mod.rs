pub mod auth;
pub mod crews;
pub mod dashboard;
pub mod error;
pub mod form;
pub mod lifecycle;
pub mod notice;
pub mod organization;
pub mod requests;
pub mod session;
pub mod surveys;
pub mod users;

use crate::state::SharedState;
use axum::{routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(auth::router(state.clone()))
        .merge(dashboard::router(state.clone()))
        .merge(users::router(state.clone()))
        .merge(organization::router(state.clone()))
        .merge(crews::router(state.clone()))
        .merge(surveys::router(state.clone()))
        .merge(requests::router(state))
}
