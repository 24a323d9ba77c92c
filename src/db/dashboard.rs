use super::requests::{recent_requests, RequestRow};
use crate::domain::models::status_names;
use anyhow::Result;
use serde::Serialize;
use sqlx::PgPool;

pub const RECENT_LIMIT: i64 = 5;

#[derive(Debug, Serialize)]
pub struct DashboardCounts {
    pub total_users: i64,
    pub created: i64,
    pub derived: i64,
    pub rejected: i64,
    pub finished: i64,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub counts: DashboardCounts,
    pub recent: Vec<RequestRow>,
}

/// Requests whose status is one of `names`, in any state.
pub async fn count_with_status(pool: &PgPool, names: &[&str]) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM requests r
        JOIN request_statuses st ON st.id = r.status_id
        WHERE st.name = ANY($1)
        "#,
    )
    .bind(names)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Computed on every call; nothing is cached.
pub async fn load(pool: &PgPool) -> Result<Dashboard> {
    let total_users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    let counts = DashboardCounts {
        total_users,
        created: count_with_status(pool, status_names::OPEN).await?,
        derived: count_with_status(pool, status_names::DERIVED).await?,
        rejected: count_with_status(pool, status_names::REJECTED).await?,
        finished: count_with_status(pool, status_names::FINISHED).await?,
    };

    let recent = recent_requests(pool, RECENT_LIMIT).await?;

    Ok(Dashboard { counts, recent })
}
