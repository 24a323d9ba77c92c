pub mod crews;
pub mod dashboard;
pub mod lifecycle;
pub mod organization;
pub mod requests;
pub mod seed;
pub mod surveys;

use crate::domain::models::Role;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DbUser {
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

impl DbUser {
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let name = name.trim();
        if name.is_empty() {
            self.username.clone()
        } else {
            name.to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Profile {
    pub user_id: i32,
    pub group_id: i32,
    pub phone: Option<String>,
}

/// User joined with its profile's group, for listings.
#[derive(Debug, Serialize, FromRow)]
pub struct UserRow {
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub group_id: Option<i32>,
    pub group_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Default, PartialEq, Eq)]
pub struct UserSummary {
    pub total_users: i64,
    pub active_users: i64,
    pub active_administrators: i64,
    pub joined_last_30_days: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct SelectOption {
    pub id: i32,
    pub label: String,
}

#[derive(Debug)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub phone: Option<&'a str>,
    pub role: Role,
    pub password_hash: &'a str,
}

#[derive(Debug)]
pub struct UserUpdate<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub phone: Option<&'a str>,
    pub role: Role,
}

/// Result of an insert or update that references other rows.
#[derive(Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(i32),
    NotFound,
    /// A referenced row (parent, owner, leader…) does not exist.
    MissingReference,
}

impl WriteOutcome {
    /// Maps a write result, turning FK violations into `MissingReference`.
    pub fn from_result(result: Result<Option<i32>, sqlx::Error>) -> Result<Self> {
        match result {
            Ok(Some(id)) => Ok(WriteOutcome::Written(id)),
            Ok(None) => Ok(WriteOutcome::NotFound),
            Err(e) if is_foreign_key_violation(&e) => Ok(WriteOutcome::MissingReference),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// Still referenced as leader by this many crews.
    Protected(i64),
}

/// SQL for a user's display name, given the users table alias.
pub fn display_name_sql(alias: &str) -> String {
    format!(
        "COALESCE(NULLIF(TRIM({a}.first_name || ' ' || {a}.last_name), ''), {a}.username)",
        a = alias
    )
}

const USER_COLUMNS: &str =
    "id, username, first_name, last_name, email, password_hash, is_active, date_joined";

pub async fn find_user_by_id(pool: &PgPool, id: i32) -> Result<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Login lookup: only active accounts can authenticate.
pub async fn find_active_user_by_username(pool: &PgPool, username: &str) -> Result<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND is_active = true"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn username_taken(pool: &PgPool, username: &str) -> Result<bool> {
    let taken = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
        .bind(username)
        .fetch_one(pool)
        .await?;
    Ok(taken)
}

pub async fn find_profile(pool: &PgPool, user_id: i32) -> Result<Option<Profile>> {
    let profile = sqlx::query_as::<_, Profile>(
        "SELECT user_id, group_id, phone FROM profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(profile)
}

const USER_ROW_SELECT: &str = r#"
    SELECT u.id, u.username, u.first_name, u.last_name, u.email, u.is_active, u.date_joined,
           p.group_id, g.name AS group_name, p.phone
    FROM users u
    LEFT JOIN profiles p ON p.user_id = u.id
    LEFT JOIN groups g ON g.id = p.group_id
"#;

pub async fn list_users(pool: &PgPool, active: bool) -> Result<Vec<UserRow>> {
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        "{USER_ROW_SELECT} WHERE u.is_active = $1 ORDER BY u.username"
    ))
    .bind(active)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_user_row(pool: &PgPool, id: i32) -> Result<Option<UserRow>> {
    let row = sqlx::query_as::<_, UserRow>(&format!("{USER_ROW_SELECT} WHERE u.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn user_summary(pool: &PgPool) -> Result<UserSummary> {
    let (total_users, active_users, joined_last_30_days): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COUNT(*) FILTER (WHERE is_active),
            COUNT(*) FILTER (WHERE date_joined >= NOW() - INTERVAL '30 days')
        FROM users
        "#,
    )
    .fetch_one(pool)
    .await?;

    let active_administrators = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM profiles p
        JOIN users u ON u.id = p.user_id
        WHERE p.group_id = $1 AND u.is_active
        "#,
    )
    .bind(Role::Secpla.id())
    .fetch_one(pool)
    .await?;

    Ok(UserSummary {
        total_users,
        active_users,
        active_administrators,
        joined_last_30_days,
    })
}

/// Active users of a role, as select options.
pub async fn users_in_role(pool: &PgPool, role: Role) -> Result<Vec<SelectOption>> {
    let rows = sqlx::query_as::<_, SelectOption>(&format!(
        r#"
        SELECT u.id, {} AS label
        FROM users u
        JOIN profiles p ON p.user_id = u.id
        WHERE u.is_active AND p.group_id = $1
        ORDER BY label
        "#,
        display_name_sql("u")
    ))
    .bind(role.id())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Whether `user_id` is an active user whose profile carries `role`; the same
/// set `users_in_role` offers.
pub async fn user_in_role(pool: &PgPool, user_id: i32, role: Role) -> Result<bool> {
    let found = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1
            FROM users u
            JOIN profiles p ON p.user_id = u.id
            WHERE u.id = $1 AND u.is_active AND p.group_id = $2
        )
        "#,
    )
    .bind(user_id)
    .bind(role.id())
    .fetch_one(pool)
    .await?;
    Ok(found)
}

pub async fn create_user(pool: &PgPool, user: &NewUser<'_>) -> Result<i32> {
    let mut tx = pool.begin().await?;
    let id = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO users (username, first_name, last_name, email, password_hash)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(user.username)
    .bind(user.first_name)
    .bind(user.last_name)
    .bind(user.email)
    .bind(user.password_hash)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO profiles (user_id, group_id, phone) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(user.role.id())
        .bind(user.phone)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(id)
}

/// Updates the user and upserts its profile. Returns false when the user is gone.
pub async fn update_user(pool: &PgPool, id: i32, update: &UserUpdate<'_>) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let updated = sqlx::query(
        "UPDATE users SET first_name = $1, last_name = $2, email = $3 WHERE id = $4",
    )
    .bind(update.first_name)
    .bind(update.last_name)
    .bind(update.email)
    .bind(id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO profiles (user_id, group_id, phone)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id) DO UPDATE
        SET group_id = EXCLUDED.group_id, phone = EXCLUDED.phone
        "#,
    )
    .bind(id)
    .bind(update.role.id())
    .bind(update.phone)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// Returns false when no such user exists.
pub async fn set_user_active(pool: &PgPool, id: i32, active: bool) -> Result<bool> {
    let result = sqlx::query("UPDATE users SET is_active = $1 WHERE id = $2")
        .bind(active)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Hard delete. Refused while any crew names the user as leader.
pub async fn delete_user(pool: &PgPool, id: i32) -> Result<DeleteOutcome> {
    let led = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM crews WHERE leader_id = $1")
        .bind(id)
        .fetch_one(pool)
        .await?;
    if led > 0 {
        return Ok(DeleteOutcome::Protected(led));
    }

    match sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
    {
        Ok(done) if done.rows_affected() == 0 => Ok(DeleteOutcome::NotFound),
        Ok(_) => Ok(DeleteOutcome::Deleted),
        // A crew gained this leader between the check and the delete
        Err(e) if is_foreign_key_violation(&e) => Ok(DeleteOutcome::Protected(1)),
        Err(e) => Err(e.into()),
    }
}

pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23503"),
        _ => false,
    }
}

/// Escapes `%`/`_` and wraps for a case-insensitive contains match.
pub fn like_pattern(query: &str) -> String {
    let escaped = query
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" obras "), "%obras%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }

    #[test]
    fn full_name_falls_back_to_username() {
        let mut user = DbUser {
            id: 1,
            username: "jperez".into(),
            first_name: "".into(),
            last_name: " ".into(),
            email: "".into(),
            password_hash: "".into(),
            is_active: true,
            date_joined: Utc::now(),
        };
        assert_eq!(user.full_name(), "jperez");
        user.first_name = "Juan".into();
        user.last_name = "Pérez".into();
        assert_eq!(user.full_name(), "Juan Pérez");
    }
}
