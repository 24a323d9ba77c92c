//! Directions and departments, the two levels above crews.

use super::{display_name_sql, like_pattern, SelectOption, WriteOutcome};
use crate::domain::models::EntityState;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

#[derive(Debug, Serialize, FromRow)]
pub struct DirectionRow {
    pub id: i32,
    pub name: String,
    pub owner_id: i32,
    pub owner_name: String,
    pub state: EntityState,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub num_departments: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct DepartmentRow {
    pub id: i32,
    pub name: String,
    pub direction_id: i32,
    pub direction_name: String,
    pub owner_id: i32,
    pub owner_name: String,
    pub state: EntityState,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub num_crews: i64,
}

fn direction_select() -> String {
    format!(
        r#"
        SELECT d.id, d.name, d.owner_id, {owner} AS owner_name, d.state, d.created, d.updated,
               (SELECT COUNT(*) FROM departments dep WHERE dep.direction_id = d.id) AS num_departments
        FROM directions d
        JOIN users u ON u.id = d.owner_id
        "#,
        owner = display_name_sql("u")
    )
}

/// Directions in `state`, optionally filtered by name or owner name.
pub async fn list_directions(
    pool: &PgPool,
    state: EntityState,
    search: Option<&str>,
) -> Result<Vec<DirectionRow>> {
    let pattern = search.filter(|q| !q.trim().is_empty()).map(like_pattern);
    let rows = sqlx::query_as::<_, DirectionRow>(&format!(
        r#"
        {}
        WHERE d.state = $1
          AND ($2::text IS NULL
               OR d.name ILIKE $2
               OR u.first_name ILIKE $2
               OR u.last_name ILIKE $2)
        ORDER BY d.name
        "#,
        direction_select()
    ))
    .bind(state)
    .bind(pattern)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_direction(pool: &PgPool, id: i32) -> Result<Option<DirectionRow>> {
    let row = sqlx::query_as::<_, DirectionRow>(&format!("{} WHERE d.id = $1", direction_select()))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn create_direction(pool: &PgPool, name: &str, owner_id: i32) -> Result<WriteOutcome> {
    let result = sqlx::query_scalar::<_, i32>(
        "INSERT INTO directions (name, owner_id) VALUES ($1, $2) RETURNING id",
    )
    .bind(name)
    .bind(owner_id)
    .fetch_optional(pool)
    .await;
    WriteOutcome::from_result(result)
}

pub async fn update_direction(pool: &PgPool, id: i32, name: &str, owner_id: i32) -> Result<WriteOutcome> {
    let result = sqlx::query_scalar::<_, i32>(
        "UPDATE directions SET name = $1, owner_id = $2, updated = NOW() WHERE id = $3 RETURNING id",
    )
    .bind(name)
    .bind(owner_id)
    .bind(id)
    .fetch_optional(pool)
    .await;
    WriteOutcome::from_result(result)
}

pub async fn direction_options(pool: &PgPool) -> Result<Vec<SelectOption>> {
    let rows = sqlx::query_as::<_, SelectOption>(
        "SELECT id, name AS label FROM directions WHERE state = 'Activo' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

fn department_select() -> String {
    format!(
        r#"
        SELECT dep.id, dep.name, dep.direction_id, d.name AS direction_name,
               dep.owner_id, {owner} AS owner_name, dep.state, dep.created, dep.updated,
               (SELECT COUNT(*) FROM crews c WHERE c.department_id = dep.id) AS num_crews
        FROM departments dep
        JOIN directions d ON d.id = dep.direction_id
        JOIN users u ON u.id = dep.owner_id
        "#,
        owner = display_name_sql("u")
    )
}

/// Departments in `state`; the search also matches the parent direction.
pub async fn list_departments(
    pool: &PgPool,
    state: EntityState,
    search: Option<&str>,
) -> Result<Vec<DepartmentRow>> {
    let pattern = search.filter(|q| !q.trim().is_empty()).map(like_pattern);
    let rows = sqlx::query_as::<_, DepartmentRow>(&format!(
        r#"
        {}
        WHERE dep.state = $1
          AND ($2::text IS NULL
               OR dep.name ILIKE $2
               OR u.first_name ILIKE $2
               OR u.last_name ILIKE $2
               OR d.name ILIKE $2)
        ORDER BY dep.name
        "#,
        department_select()
    ))
    .bind(state)
    .bind(pattern)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn departments_of_direction(pool: &PgPool, direction_id: i32) -> Result<Vec<DepartmentRow>> {
    let rows = sqlx::query_as::<_, DepartmentRow>(&format!(
        "{} WHERE dep.direction_id = $1 ORDER BY dep.name",
        department_select()
    ))
    .bind(direction_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_department(pool: &PgPool, id: i32) -> Result<Option<DepartmentRow>> {
    let row = sqlx::query_as::<_, DepartmentRow>(&format!("{} WHERE dep.id = $1", department_select()))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn count_departments(pool: &PgPool, state: EntityState) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM departments WHERE state = $1")
        .bind(state)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn create_department(
    pool: &PgPool,
    name: &str,
    direction_id: i32,
    owner_id: i32,
) -> Result<WriteOutcome> {
    let result = sqlx::query_scalar::<_, i32>(
        "INSERT INTO departments (name, direction_id, owner_id) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(name)
    .bind(direction_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await;
    WriteOutcome::from_result(result)
}

pub async fn update_department(
    pool: &PgPool,
    id: i32,
    name: &str,
    direction_id: i32,
    owner_id: i32,
) -> Result<WriteOutcome> {
    let result = sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE departments
        SET name = $1, direction_id = $2, owner_id = $3, updated = NOW()
        WHERE id = $4
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(direction_id)
    .bind(owner_id)
    .bind(id)
    .fetch_optional(pool)
    .await;
    WriteOutcome::from_result(result)
}

pub async fn department_options(pool: &PgPool) -> Result<Vec<SelectOption>> {
    let rows = sqlx::query_as::<_, SelectOption>(
        "SELECT id, name AS label FROM departments WHERE state = 'Activo' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
