//! Survey types, surveys and their questions.

use super::{SelectOption, WriteOutcome};
use crate::domain::models::EntityState;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

#[derive(Debug, Serialize, FromRow)]
pub struct SurveyType {
    pub id: i32,
    pub name: String,
    pub state: EntityState,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct SurveyRow {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub department_id: i32,
    pub department_name: String,
    pub survey_type_id: i32,
    pub survey_type_name: String,
    pub state: EntityState,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Question {
    pub id: i32,
    pub survey_id: i32,
    pub text: String,
    pub state: EntityState,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SurveyFields<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub department_id: i32,
    pub survey_type_id: i32,
}

pub async fn list_survey_types(pool: &PgPool, state: EntityState) -> Result<Vec<SurveyType>> {
    let rows = sqlx::query_as::<_, SurveyType>(
        "SELECT id, name, state, created, updated FROM survey_types WHERE state = $1 ORDER BY name",
    )
    .bind(state)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_survey_type(pool: &PgPool, id: i32) -> Result<Option<SurveyType>> {
    let row = sqlx::query_as::<_, SurveyType>(
        "SELECT id, name, state, created, updated FROM survey_types WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn create_survey_type(pool: &PgPool, name: &str) -> Result<i32> {
    let id = sqlx::query_scalar::<_, i32>("INSERT INTO survey_types (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(id)
}

pub async fn update_survey_type(pool: &PgPool, id: i32, name: &str) -> Result<bool> {
    let done = sqlx::query("UPDATE survey_types SET name = $1, updated = NOW() WHERE id = $2")
        .bind(name)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}

pub async fn survey_type_options(pool: &PgPool) -> Result<Vec<SelectOption>> {
    let rows = sqlx::query_as::<_, SelectOption>(
        "SELECT id, name AS label FROM survey_types WHERE state = 'Activo' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

const SURVEY_SELECT: &str = r#"
    SELECT s.id, s.title, s.description, s.department_id, dep.name AS department_name,
           s.survey_type_id, t.name AS survey_type_name, s.state, s.created, s.updated
    FROM surveys s
    JOIN departments dep ON dep.id = s.department_id
    JOIN survey_types t ON t.id = s.survey_type_id
"#;

pub async fn list_surveys(pool: &PgPool, state: EntityState) -> Result<Vec<SurveyRow>> {
    let rows = sqlx::query_as::<_, SurveyRow>(&format!("{SURVEY_SELECT} WHERE s.state = $1 ORDER BY s.title"))
        .bind(state)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn get_survey(pool: &PgPool, id: i32) -> Result<Option<SurveyRow>> {
    let row = sqlx::query_as::<_, SurveyRow>(&format!("{SURVEY_SELECT} WHERE s.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn create_survey(pool: &PgPool, fields: &SurveyFields<'_>) -> Result<WriteOutcome> {
    let result = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO surveys (title, description, department_id, survey_type_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(fields.title)
    .bind(fields.description)
    .bind(fields.department_id)
    .bind(fields.survey_type_id)
    .fetch_optional(pool)
    .await;
    WriteOutcome::from_result(result)
}

pub async fn update_survey(pool: &PgPool, id: i32, fields: &SurveyFields<'_>) -> Result<WriteOutcome> {
    let result = sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE surveys
        SET title = $1, description = $2, department_id = $3, survey_type_id = $4, updated = NOW()
        WHERE id = $5
        RETURNING id
        "#,
    )
    .bind(fields.title)
    .bind(fields.description)
    .bind(fields.department_id)
    .bind(fields.survey_type_id)
    .bind(id)
    .fetch_optional(pool)
    .await;
    WriteOutcome::from_result(result)
}

pub async fn survey_options(pool: &PgPool) -> Result<Vec<SelectOption>> {
    let rows = sqlx::query_as::<_, SelectOption>(
        "SELECT id, title AS label FROM surveys WHERE state = 'Activo' ORDER BY title",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Questions of a survey in `state`, oldest first.
pub async fn list_questions(pool: &PgPool, survey_id: i32, state: EntityState) -> Result<Vec<Question>> {
    let rows = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, survey_id, text, state, created, updated
        FROM questions
        WHERE survey_id = $1 AND state = $2
        ORDER BY created, id
        "#,
    )
    .bind(survey_id)
    .bind(state)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_question(pool: &PgPool, id: i32) -> Result<Option<Question>> {
    let row = sqlx::query_as::<_, Question>(
        "SELECT id, survey_id, text, state, created, updated FROM questions WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn create_question(pool: &PgPool, survey_id: i32, text: &str) -> Result<WriteOutcome> {
    let result = sqlx::query_scalar::<_, i32>(
        "INSERT INTO questions (survey_id, text) VALUES ($1, $2) RETURNING id",
    )
    .bind(survey_id)
    .bind(text)
    .fetch_optional(pool)
    .await;
    WriteOutcome::from_result(result)
}

pub async fn update_question(pool: &PgPool, id: i32, text: &str) -> Result<bool> {
    let done = sqlx::query("UPDATE questions SET text = $1, updated = NOW() WHERE id = $2")
        .bind(text)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}
