//! Block, unblock and delete handlers shared by every stateful area.

use crate::db::lifecycle::{self, TransitionOutcome};
use crate::domain::lifecycle::{Stateful, Transition, TransitionError};
use crate::domain::models::EntityState;
use crate::state::SharedState;
use crate::web::error::ActionError;
use crate::web::notice::{redirect_with, Notice};
use crate::web::session::Caller;
use axum::response::Response;

/// Applies `transition` to one row, then returns to `back`.
pub async fn toggle(
    state: &SharedState,
    caller: &Caller,
    entity: Stateful,
    id: i32,
    transition: Transition,
    back: &str,
) -> Result<Response, ActionError> {
    caller.require(entity.permission())?;

    match lifecycle::transition(&state.pool, entity, id, transition).await? {
        TransitionOutcome::Applied => {
            tracing::info!(
                "User {} applied {:?} to {} {}",
                caller.user_id,
                transition,
                entity.table(),
                id
            );
            Ok(redirect_with(back, Notice::success(toggle_message(entity, transition))))
        }
        TransitionOutcome::NotFound => Err(ActionError::NotFound),
        TransitionOutcome::Rejected(e) => Err(ActionError::rejected(back, rejection_message(entity, e))),
    }
}

/// Hard delete, then back to `back`.
pub async fn remove(
    state: &SharedState,
    caller: &Caller,
    entity: Stateful,
    id: i32,
    back: &str,
) -> Result<Response, ActionError> {
    caller.require(entity.permission())?;

    if !lifecycle::delete(&state.pool, entity, id).await? {
        return Err(ActionError::NotFound);
    }
    tracing::info!("User {} deleted {} {}", caller.user_id, entity.table(), id);
    Ok(redirect_with(
        back,
        Notice::success(format!("Se ha eliminado {}.", entity.noun())),
    ))
}

fn toggle_message(entity: Stateful, transition: Transition) -> String {
    match transition {
        Transition::Block => format!("Se ha bloqueado {}.", entity.noun()),
        Transition::Unblock => format!("Se ha desbloqueado {}.", entity.noun()),
    }
}

fn rejection_message(entity: Stateful, error: TransitionError) -> String {
    let current = match error {
        TransitionError::AlreadyBlocked => EntityState::Bloqueado,
        TransitionError::AlreadyActive => EntityState::Activo,
    };
    capitalize(&format!("{} ya se encuentra en estado {}.", entity.noun(), current))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
