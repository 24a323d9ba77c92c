use super::{display_name_sql, like_pattern, SelectOption, WriteOutcome};
use crate::domain::models::EntityState;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

#[derive(Debug, Serialize, FromRow)]
pub struct CrewRow {
    pub id: i32,
    pub name: String,
    pub department_id: i32,
    pub department_name: String,
    pub leader_id: i32,
    pub leader_name: String,
    pub state: EntityState,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

fn crew_select() -> String {
    format!(
        r#"
        SELECT c.id, c.name, c.department_id, dep.name AS department_name,
               c.leader_id, {leader} AS leader_name, c.state, c.created, c.updated
        FROM crews c
        JOIN departments dep ON dep.id = c.department_id
        JOIN users u ON u.id = c.leader_id
        "#,
        leader = display_name_sql("u")
    )
}

/// Crews in `state`, optionally filtered by crew, department or leader name.
pub async fn list_crews(pool: &PgPool, state: EntityState, search: Option<&str>) -> Result<Vec<CrewRow>> {
    let pattern = search.filter(|q| !q.trim().is_empty()).map(like_pattern);
    let rows = sqlx::query_as::<_, CrewRow>(&format!(
        r#"
        {}
        WHERE c.state = $1
          AND ($2::text IS NULL
               OR c.name ILIKE $2
               OR dep.name ILIKE $2
               OR u.first_name ILIKE $2
               OR u.last_name ILIKE $2)
        ORDER BY c.name
        "#,
        crew_select()
    ))
    .bind(state)
    .bind(pattern)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn crews_of_department(pool: &PgPool, department_id: i32) -> Result<Vec<CrewRow>> {
    let rows = sqlx::query_as::<_, CrewRow>(&format!(
        "{} WHERE c.department_id = $1 ORDER BY c.name",
        crew_select()
    ))
    .bind(department_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_crew(pool: &PgPool, id: i32) -> Result<Option<CrewRow>> {
    let row = sqlx::query_as::<_, CrewRow>(&format!("{} WHERE c.id = $1", crew_select()))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn count_crews(pool: &PgPool, state: EntityState) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM crews WHERE state = $1")
        .bind(state)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn create_crew(pool: &PgPool, name: &str, department_id: i32, leader_id: i32) -> Result<WriteOutcome> {
    let result = sqlx::query_scalar::<_, i32>(
        "INSERT INTO crews (name, department_id, leader_id) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(name)
    .bind(department_id)
    .bind(leader_id)
    .fetch_optional(pool)
    .await;
    WriteOutcome::from_result(result)
}

pub async fn update_crew(
    pool: &PgPool,
    id: i32,
    name: &str,
    department_id: i32,
    leader_id: i32,
) -> Result<WriteOutcome> {
    let result = sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE crews
        SET name = $1, department_id = $2, leader_id = $3, updated = NOW()
        WHERE id = $4
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(department_id)
    .bind(leader_id)
    .bind(id)
    .fetch_optional(pool)
    .await;
    WriteOutcome::from_result(result)
}

pub async fn crew_options(pool: &PgPool) -> Result<Vec<SelectOption>> {
    let rows = sqlx::query_as::<_, SelectOption>(
        "SELECT id, name AS label FROM crews WHERE state = 'Activo' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
