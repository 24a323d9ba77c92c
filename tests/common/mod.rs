//! Shared fixtures for the database-backed integration tests.
//!
//! Tests run against `DATABASE_URL` when it is set and return early otherwise.
#![allow(dead_code)]

use axum::Router;
use gestion_municipal::config::AppConfig;
use gestion_municipal::db::{self, crews, organization, requests, seed, surveys, NewUser, WriteOutcome};
use gestion_municipal::domain::models::{status_names, Priority, Role};
use gestion_municipal::state::AppState;
use gestion_municipal::storage::DiskStore;
use gestion_municipal::web;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

pub const SESSION_KEY_B64: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

pub fn init_test_env() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Migrated and seeded pool, or `None` when no database is configured.
pub async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    init_test_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");
    seed::seed_all(&pool).await.expect("failed to seed");
    Some(pool)
}

pub fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

pub fn written(outcome: WriteOutcome) -> i32 {
    match outcome {
        WriteOutcome::Written(id) => id,
        other => panic!("write failed: {:?}", other),
    }
}

pub async fn create_user(pool: &PgPool, role: Role) -> i32 {
    let username = unique(role.group_name());
    db::create_user(
        pool,
        &NewUser {
            username: &username,
            first_name: "Prueba",
            last_name: role.group_name(),
            email: "",
            phone: None,
            role,
            password_hash: "unused",
        },
    )
    .await
    .expect("create user")
}

/// One branch of the organizational tree plus a survey with a question.
pub struct Fixture {
    pub admin: i32,
    pub territorial: i32,
    pub leader: i32,
    pub direction_id: i32,
    pub department_id: i32,
    pub crew_id: i32,
    pub survey_id: i32,
    pub question_id: i32,
}

impl Fixture {
    pub async fn build(pool: &PgPool) -> Self {
        let admin = create_user(pool, Role::Secpla).await;
        let territorial = create_user(pool, Role::Territorial).await;
        let leader = create_user(pool, Role::Cuadrilla).await;
        let director = create_user(pool, Role::Direccion).await;
        let head = create_user(pool, Role::Departamento).await;

        let direction_id = written(
            organization::create_direction(pool, &unique("Dirección"), director)
                .await
                .unwrap(),
        );
        let department_id = written(
            organization::create_department(pool, &unique("Departamento"), direction_id, head)
                .await
                .unwrap(),
        );
        let crew_id = written(
            crews::create_crew(pool, &unique("Cuadrilla"), department_id, leader)
                .await
                .unwrap(),
        );

        let survey_type_id = surveys::create_survey_type(pool, &unique("Tipo")).await.unwrap();
        let survey_id = written(
            surveys::create_survey(
                pool,
                &surveys::SurveyFields {
                    title: &unique("Encuesta"),
                    description: "",
                    department_id,
                    survey_type_id,
                },
            )
            .await
            .unwrap(),
        );
        let question_id = written(
            surveys::create_question(pool, survey_id, "¿Estado de la vereda?")
                .await
                .unwrap(),
        );

        Self {
            admin,
            territorial,
            leader,
            direction_id,
            department_id,
            crew_id,
            survey_id,
            question_id,
        }
    }

    pub async fn create_request(&self, pool: &PgPool, title: &str, crew_id: Option<i32>) -> i32 {
        let status_id = requests::find_status_by_name(pool, status_names::CREATED)
            .await
            .unwrap()
            .expect("seeded status");
        written(
            requests::create_request(
                pool,
                &requests::RequestFields {
                    survey_id: self.survey_id,
                    territorial_id: self.territorial,
                    crew_id,
                    status_id,
                    title,
                    description: None,
                    location: None,
                    priority: Priority::Normal,
                },
            )
            .await
            .unwrap(),
        )
    }
}

pub fn app(pool: PgPool) -> Router {
    let config = AppConfig::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://unused".to_string()),
        "SESSION_KEY" => Some(SESSION_KEY_B64.to_string()),
        _ => None,
    })
    .expect("test config");
    let media = Arc::new(DiskStore::new(std::env::temp_dir().join("gestion-municipal-tests")));
    web::routes(Arc::new(AppState::new(pool, &config, media)))
}

pub fn session_cookie(user_id: i32) -> String {
    let token = web::session::sign_session(user_id, b"0123456789abcdef0123456789abcdef")
        .expect("sign session");
    format!("session={token}")
}
