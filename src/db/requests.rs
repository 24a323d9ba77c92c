//! Requests (solicitudes), their append-only answers and attachments.

use super::{display_name_sql, SelectOption, WriteOutcome};
use crate::domain::access::RequestScope;
use crate::domain::models::{EntityState, MediaKind, MediaOwner, Priority};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

#[derive(Debug, Serialize, FromRow)]
pub struct RequestRow {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub priority: Priority,
    pub state: EntityState,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub survey_id: i32,
    pub survey_title: String,
    pub territorial_id: i32,
    pub territorial_name: String,
    pub crew_id: Option<i32>,
    pub crew_name: Option<String>,
    pub crew_leader_id: Option<i32>,
    pub status_id: i32,
    pub status_name: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct RequestStatus {
    pub id: i32,
    pub name: String,
    pub state: EntityState,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RequestFields<'a> {
    pub survey_id: i32,
    pub territorial_id: i32,
    pub crew_id: Option<i32>,
    pub status_id: i32,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub location: Option<&'a str>,
    pub priority: Priority,
}

#[derive(Debug, Serialize, FromRow)]
pub struct AnswerRow {
    pub id: i32,
    pub request_id: i32,
    pub question_id: i32,
    pub question_text: String,
    pub text: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct MediaRow {
    pub id: i32,
    pub answer_id: Option<i32>,
    pub request_id: Option<i32>,
    pub kind: MediaKind,
    pub file_path: String,
    pub description: Option<String>,
    pub created: DateTime<Utc>,
}

impl MediaRow {
    pub fn owner(&self) -> Option<MediaOwner> {
        MediaOwner::from_columns(self.answer_id, self.request_id)
    }
}

fn request_select() -> String {
    format!(
        r#"
        SELECT r.id, r.title, r.description, r.location, r.priority, r.state, r.created, r.updated,
               r.survey_id, s.title AS survey_title,
               r.territorial_id, {territorial} AS territorial_name,
               r.crew_id, c.name AS crew_name, c.leader_id AS crew_leader_id,
               r.status_id, st.name AS status_name
        FROM requests r
        JOIN surveys s ON s.id = r.survey_id
        JOIN users t ON t.id = r.territorial_id
        JOIN request_statuses st ON st.id = r.status_id
        LEFT JOIN crews c ON c.id = r.crew_id
        "#,
        territorial = display_name_sql("t")
    )
}

/// Requests in `state` visible under `scope`, newest first.
pub async fn list_requests(pool: &PgPool, state: EntityState, scope: RequestScope) -> Result<Vec<RequestRow>> {
    let (filter, user_id) = match scope {
        RequestScope::All => ("TRUE", None),
        RequestScope::OwnedBy(id) => ("r.territorial_id = $2", Some(id)),
        RequestScope::LedBy(id) => ("c.leader_id = $2", Some(id)),
    };
    let sql = format!(
        "{} WHERE r.state = $1 AND {} ORDER BY r.created DESC, r.id DESC",
        request_select(),
        filter
    );

    let query = sqlx::query_as::<_, RequestRow>(&sql).bind(state);
    let query = match user_id {
        Some(id) => query.bind(id),
        None => query,
    };
    Ok(query.fetch_all(pool).await?)
}

/// Newest requests regardless of state.
pub async fn recent_requests(pool: &PgPool, limit: i64) -> Result<Vec<RequestRow>> {
    let rows = sqlx::query_as::<_, RequestRow>(&format!(
        "{} ORDER BY r.created DESC, r.id DESC LIMIT $1",
        request_select()
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_request(pool: &PgPool, id: i32) -> Result<Option<RequestRow>> {
    let row = sqlx::query_as::<_, RequestRow>(&format!("{} WHERE r.id = $1", request_select()))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_status_by_name(pool: &PgPool, name: &str) -> Result<Option<i32>> {
    let id = sqlx::query_scalar::<_, i32>("SELECT id FROM request_statuses WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

pub async fn list_statuses(pool: &PgPool, state: EntityState) -> Result<Vec<RequestStatus>> {
    let rows = sqlx::query_as::<_, RequestStatus>(
        "SELECT id, name, state, created, updated FROM request_statuses WHERE state = $1 ORDER BY id",
    )
    .bind(state)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn status_options(pool: &PgPool) -> Result<Vec<SelectOption>> {
    let rows = sqlx::query_as::<_, SelectOption>(
        "SELECT id, name AS label FROM request_statuses WHERE state = 'Activo' ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn create_request(pool: &PgPool, fields: &RequestFields<'_>) -> Result<WriteOutcome> {
    let result = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO requests
            (survey_id, territorial_id, crew_id, status_id, title, description, location, priority)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(fields.survey_id)
    .bind(fields.territorial_id)
    .bind(fields.crew_id)
    .bind(fields.status_id)
    .bind(fields.title)
    .bind(fields.description)
    .bind(fields.location)
    .bind(fields.priority)
    .fetch_optional(pool)
    .await;
    WriteOutcome::from_result(result)
}

pub async fn update_request(pool: &PgPool, id: i32, fields: &RequestFields<'_>) -> Result<WriteOutcome> {
    let result = sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE requests
        SET survey_id = $1, territorial_id = $2, crew_id = $3, status_id = $4,
            title = $5, description = $6, location = $7, priority = $8, updated = NOW()
        WHERE id = $9
        RETURNING id
        "#,
    )
    .bind(fields.survey_id)
    .bind(fields.territorial_id)
    .bind(fields.crew_id)
    .bind(fields.status_id)
    .bind(fields.title)
    .bind(fields.description)
    .bind(fields.location)
    .bind(fields.priority)
    .bind(id)
    .fetch_optional(pool)
    .await;
    WriteOutcome::from_result(result)
}

/// Always appends; earlier answers to the same question are kept.
pub async fn insert_answer(pool: &PgPool, request_id: i32, question_id: i32, text: &str) -> Result<WriteOutcome> {
    let result = sqlx::query_scalar::<_, i32>(
        "INSERT INTO answers (request_id, question_id, text) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(request_id)
    .bind(question_id)
    .bind(text)
    .fetch_optional(pool)
    .await;
    WriteOutcome::from_result(result)
}

const ANSWER_SELECT: &str = r#"
    SELECT a.id, a.request_id, a.question_id, q.text AS question_text, a.text, a.created
    FROM answers a
    JOIN questions q ON q.id = a.question_id
"#;

/// Every answer of a request, oldest first.
pub async fn list_answers(pool: &PgPool, request_id: i32) -> Result<Vec<AnswerRow>> {
    let rows = sqlx::query_as::<_, AnswerRow>(&format!(
        "{ANSWER_SELECT} WHERE a.request_id = $1 ORDER BY a.created, a.id"
    ))
    .bind(request_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// The latest answer per question.
pub async fn current_answers(pool: &PgPool, request_id: i32) -> Result<Vec<AnswerRow>> {
    let rows = sqlx::query_as::<_, AnswerRow>(
        r#"
        SELECT DISTINCT ON (a.question_id)
               a.id, a.request_id, a.question_id, q.text AS question_text, a.text, a.created
        FROM answers a
        JOIN questions q ON q.id = a.question_id
        WHERE a.request_id = $1
        ORDER BY a.question_id, a.created DESC, a.id DESC
        "#,
    )
    .bind(request_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_answer(pool: &PgPool, id: i32) -> Result<Option<AnswerRow>> {
    let row = sqlx::query_as::<_, AnswerRow>(&format!("{ANSWER_SELECT} WHERE a.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn insert_media(
    pool: &PgPool,
    owner: MediaOwner,
    kind: MediaKind,
    file_path: &str,
    description: Option<&str>,
) -> Result<WriteOutcome> {
    let (answer_id, request_id) = owner.columns();
    let result = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO multimedia (answer_id, request_id, kind, file_path, description)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(answer_id)
    .bind(request_id)
    .bind(kind)
    .bind(file_path)
    .bind(description)
    .fetch_optional(pool)
    .await;
    WriteOutcome::from_result(result)
}

/// Attachments of a request and of all its answers.
pub async fn media_of_request(pool: &PgPool, request_id: i32) -> Result<Vec<MediaRow>> {
    let rows = sqlx::query_as::<_, MediaRow>(
        r#"
        SELECT id, answer_id, request_id, kind, file_path, description, created
        FROM multimedia
        WHERE request_id = $1
           OR answer_id IN (SELECT id FROM answers WHERE request_id = $1)
        ORDER BY created, id
        "#,
    )
    .bind(request_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
