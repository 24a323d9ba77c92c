//! State toggles and hard deletes shared by every stateful table.

use crate::domain::lifecycle::{Stateful, Transition, TransitionError};
use crate::domain::models::EntityState;
use anyhow::Result;
use sqlx::PgPool;

#[derive(Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    NotFound,
    Rejected(TransitionError),
}

/// Conditional write `from → to`. No cascade to related rows, no history.
pub async fn transition(
    pool: &PgPool,
    entity: Stateful,
    id: i32,
    transition: Transition,
) -> Result<TransitionOutcome> {
    let update = format!(
        "UPDATE {} SET state = $1, updated = NOW() WHERE id = $2 AND state = $3",
        entity.table()
    );
    let done = sqlx::query(&update)
        .bind(transition.to_state())
        .bind(id)
        .bind(transition.from_state())
        .execute(pool)
        .await?;
    if done.rows_affected() > 0 {
        return Ok(TransitionOutcome::Applied);
    }

    let Some(current) = current_state(pool, entity, id).await? else {
        return Ok(TransitionOutcome::NotFound);
    };

    match transition.apply(current) {
        Err(e) => Ok(TransitionOutcome::Rejected(e)),
        // Another toggle landed in between; last write wins
        Ok(target) => {
            let update = format!("UPDATE {} SET state = $1, updated = NOW() WHERE id = $2", entity.table());
            sqlx::query(&update).bind(target).bind(id).execute(pool).await?;
            Ok(TransitionOutcome::Applied)
        }
    }
}

pub async fn current_state(pool: &PgPool, entity: Stateful, id: i32) -> Result<Option<EntityState>> {
    let select = format!("SELECT state FROM {} WHERE id = $1", entity.table());
    let state = sqlx::query_scalar::<_, EntityState>(&select)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(state)
}

/// True only for an existing row in the active state.
pub async fn is_active(pool: &PgPool, entity: Stateful, id: i32) -> Result<bool> {
    Ok(current_state(pool, entity, id).await? == Some(EntityState::Activo))
}

/// Unconditional hard delete; foreign keys decide what follows.
/// Returns false when the row did not exist.
pub async fn delete(pool: &PgPool, entity: Stateful, id: i32) -> Result<bool> {
    let delete = format!("DELETE FROM {} WHERE id = $1", entity.table());
    let done = sqlx::query(&delete).bind(id).execute(pool).await?;
    Ok(done.rows_affected() > 0)
}
