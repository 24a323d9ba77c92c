mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use common::{app, create_user, session_cookie, test_pool, unique, written, Fixture};
use gestion_municipal::db::{lifecycle, requests};
use gestion_municipal::domain::lifecycle::{Stateful, Transition};
use gestion_municipal::domain::models::{EntityState, Priority, Role};
use sqlx::PgPool;
use tower::ServiceExt;

async fn send(app: Router, method: Method, uri: &str, cookie: &str, form: Option<String>) -> Response {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie);
    let body = match form {
        Some(form) => {
            request = request.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
            Body::from(form)
        }
        None => Body::empty(),
    };
    app.oneshot(request.body(body).unwrap()).await.unwrap()
}

const BOUNDARY: &str = "limite-de-prueba";

async fn send_upload(app: Router, uri: &str, cookie: &str) -> Response {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"tipo\"\r\n\r\nimagen\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"descripcion\"\r\n\r\nBache en la vereda\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"archivo\"; filename=\"bache.jpg\"\r\n\
         Content-Type: image/jpeg\r\n\r\nJPEGDATA\r\n\
         --{b}--\r\n",
        b = BOUNDARY
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

async fn field_errors(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    body["errors"].clone()
}

async fn count(pool: &PgPool, query: &str, id: i32) -> i64 {
    sqlx::query_scalar::<_, i64>(query)
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn request_by_title(pool: &PgPool, title: &str) -> Option<(String, Priority, i32)> {
    sqlx::query_as::<_, (String, Priority, i32)>(
        r#"
        SELECT st.name, r.priority, r.territorial_id
        FROM requests r
        JOIN request_statuses st ON st.id = r.status_id
        WHERE r.title = $1
        "#,
    )
    .bind(title)
    .fetch_optional(pool)
    .await
    .unwrap()
}

#[tokio::test]
async fn administrator_request_without_status_starts_as_created() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;
    let title = unique("Bache");

    let form = format!(
        "survey_id={}&territorial_id={}&priority=alta&title={}",
        fixture.survey_id, fixture.territorial, title
    );
    let response = send(
        app(pool.clone()),
        Method::POST,
        "/solicitudes/crear",
        &session_cookie(fixture.admin),
        Some(form),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/solicitudes");
    let (status, priority, territorial) = request_by_title(&pool, &title).await.unwrap();
    assert_eq!(status, "Creada");
    assert_eq!(priority, Priority::Alta);
    assert_eq!(territorial, fixture.territorial);
}

#[tokio::test]
async fn territorial_request_is_assigned_to_its_author() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;
    let title = unique("Microbasural");

    // territorial_id in the form is ignored for territorial callers
    let form = format!(
        "survey_id={}&territorial_id={}&title={}",
        fixture.survey_id, fixture.admin, title
    );
    let response = send(
        app(pool.clone()),
        Method::POST,
        "/solicitudes/crear",
        &session_cookie(fixture.territorial),
        Some(form),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let (_, priority, territorial) = request_by_title(&pool, &title).await.unwrap();
    assert_eq!(territorial, fixture.territorial);
    assert_eq!(priority, Priority::Normal);
}

#[tokio::test]
async fn forbidden_role_is_redirected_and_nothing_changes() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;

    let uri = format!("/direcciones/{}/bloquear", fixture.direction_id);
    let response = send(
        app(pool.clone()),
        Method::POST,
        &uri,
        &session_cookie(fixture.territorial),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/solicitudes");
    let state = lifecycle::current_state(&pool, Stateful::Direction, fixture.direction_id)
        .await
        .unwrap();
    assert_eq!(state, Some(EntityState::Activo));
}

#[tokio::test]
async fn crew_member_cannot_create_requests() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;
    let title = unique("No-permitida");

    let form = format!("survey_id={}&title={}", fixture.survey_id, title);
    let response = send(
        app(pool.clone()),
        Method::POST,
        "/solicitudes/crear",
        &session_cookie(fixture.leader),
        Some(form),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/solicitudes");
    assert!(request_by_title(&pool, &title).await.is_none());
}

#[tokio::test]
async fn user_without_profile_is_sent_back_to_login() {
    let Some(pool) = test_pool().await else { return };
    let user_id = sqlx::query_scalar::<_, i32>(
        "INSERT INTO users (username, password_hash) VALUES ($1, 'unused') RETURNING id",
    )
    .bind(unique("sin-perfil"))
    .fetch_one(&pool)
    .await
    .unwrap();

    let response = send(app(pool), Method::GET, "/solicitudes", &session_cookie(user_id), None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn administrator_lands_on_panel() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;

    let response = send(app(pool.clone()), Method::GET, "/", &session_cookie(fixture.admin), None).await;
    assert_eq!(location(&response), "/panel");

    let response = send(app(pool), Method::GET, "/panel", &session_cookie(fixture.admin), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn survey_without_department_is_rejected() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;
    let title = unique("Encuesta-huerfana");

    let form = format!("title={}&department_id=&survey_type_id=1", title);
    let response = send(
        app(pool.clone()),
        Method::POST,
        "/encuestas/crear",
        &session_cookie(fixture.admin),
        Some(form),
    )
    .await;

    assert_eq!(location(&response), "/encuestas/crear");
    let stored = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM surveys WHERE title = $1")
        .bind(&title)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn crew_leader_attaches_media_to_its_request() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;
    let request_id = fixture
        .create_request(&pool, &unique("Con-foto"), Some(fixture.crew_id))
        .await;

    let uri = format!("/solicitudes/{request_id}/multimedia");
    let response = send_upload(app(pool.clone()), &uri, &session_cookie(fixture.leader)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/solicitudes/{request_id}"));
    let stored = count(&pool, "SELECT COUNT(*) FROM multimedia WHERE request_id = $1", request_id).await;
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn other_crew_member_cannot_attach_media() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;
    let stranger = create_user(&pool, Role::Cuadrilla).await;
    let request_id = fixture
        .create_request(&pool, &unique("Ajena"), Some(fixture.crew_id))
        .await;
    let answer_id = written(
        requests::insert_answer(&pool, request_id, fixture.question_id, "Vereda rota")
            .await
            .unwrap(),
    );

    let uri = format!("/solicitudes/{request_id}/multimedia");
    let response = send_upload(app(pool.clone()), &uri, &session_cookie(stranger)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/solicitudes");

    let uri = format!("/respuestas/{answer_id}/multimedia");
    let response = send_upload(app(pool.clone()), &uri, &session_cookie(stranger)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/solicitudes");

    let on_request = count(&pool, "SELECT COUNT(*) FROM multimedia WHERE request_id = $1", request_id).await;
    let on_answer = count(&pool, "SELECT COUNT(*) FROM multimedia WHERE answer_id = $1", answer_id).await;
    assert_eq!((on_request, on_answer), (0, 0));
}

#[tokio::test]
async fn crew_leader_attaches_media_to_an_answer() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;
    let request_id = fixture
        .create_request(&pool, &unique("Respondida"), Some(fixture.crew_id))
        .await;
    let answer_id = written(
        requests::insert_answer(&pool, request_id, fixture.question_id, "Reparada")
            .await
            .unwrap(),
    );

    let uri = format!("/respuestas/{answer_id}/multimedia");
    let response = send_upload(app(pool.clone()), &uri, &session_cookie(fixture.leader)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/solicitudes/{request_id}"));
    let stored = count(&pool, "SELECT COUNT(*) FROM multimedia WHERE answer_id = $1", answer_id).await;
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn answer_to_question_of_another_survey_is_rejected() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;
    let other = Fixture::build(&pool).await;
    let request_id = fixture.create_request(&pool, &unique("Cruzada"), None).await;

    let uri = format!("/solicitudes/{request_id}/responder/{}", other.question_id);
    let response = send(
        app(pool.clone()),
        Method::POST,
        &uri,
        &session_cookie(fixture.admin),
        Some("text=Respuesta".to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/solicitudes/{request_id}"));
    let stored = count(&pool, "SELECT COUNT(*) FROM answers WHERE request_id = $1", request_id).await;
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn edit_without_status_keeps_the_stored_one() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;
    let title = unique("Derivada");
    let request_id = fixture.create_request(&pool, &title, None).await;
    sqlx::query(
        "UPDATE requests SET status_id = (SELECT id FROM request_statuses WHERE name = 'Derivada') WHERE id = $1",
    )
    .bind(request_id)
    .execute(&pool)
    .await
    .unwrap();

    let form = format!(
        "survey_id={}&territorial_id={}&priority=baja&title={}",
        fixture.survey_id, fixture.territorial, title
    );
    let response = send(
        app(pool.clone()),
        Method::POST,
        &format!("/solicitudes/{request_id}/editar"),
        &session_cookie(fixture.admin),
        Some(form),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(field_errors(response).await["status_id"].is_string());
    let (status, priority, _) = request_by_title(&pool, &title).await.unwrap();
    assert_eq!(status, "Derivada");
    assert_eq!(priority, Priority::Normal);
}

#[tokio::test]
async fn request_with_blocked_crew_is_rejected() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;
    lifecycle::transition(&pool, Stateful::Crew, fixture.crew_id, Transition::Block)
        .await
        .unwrap();
    let title = unique("Cuadrilla-bloqueada");

    let form = format!(
        "survey_id={}&territorial_id={}&crew_id={}&title={}",
        fixture.survey_id, fixture.territorial, fixture.crew_id, title
    );
    let response = send(
        app(pool.clone()),
        Method::POST,
        "/solicitudes/crear",
        &session_cookie(fixture.admin),
        Some(form),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(field_errors(response).await["crew_id"].is_string());
    assert!(request_by_title(&pool, &title).await.is_none());
}

#[tokio::test]
async fn request_for_a_non_territorial_user_is_rejected() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;
    let title = unique("Territorial-falso");

    let form = format!(
        "survey_id={}&territorial_id={}&title={}",
        fixture.survey_id, fixture.leader, title
    );
    let response = send(
        app(pool.clone()),
        Method::POST,
        "/solicitudes/crear",
        &session_cookie(fixture.admin),
        Some(form),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let errors = field_errors(response).await;
    assert!(errors["territorial_id"].is_string());
    assert!(errors.get("survey_id").is_none());
    assert!(request_by_title(&pool, &title).await.is_none());
}

#[tokio::test]
async fn crew_led_by_a_territorial_user_is_rejected() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;
    let name = unique("Cuadrilla-mal-liderada");

    let form = format!(
        "name={}&department_id={}&leader_id={}",
        name, fixture.department_id, fixture.territorial
    );
    let response = send(
        app(pool.clone()),
        Method::POST,
        "/cuadrillas/crear",
        &session_cookie(fixture.admin),
        Some(form),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(field_errors(response).await["leader_id"].is_string());
    let stored = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM crews WHERE name = $1")
        .bind(&name)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn blocked_status_is_no_longer_accepted() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;
    let status_id = sqlx::query_scalar::<_, i32>(
        "INSERT INTO request_statuses (name) VALUES ($1) RETURNING id",
    )
    .bind(unique("En-revision"))
    .fetch_one(&pool)
    .await
    .unwrap();

    let response = send(
        app(pool.clone()),
        Method::POST,
        &format!("/estados/{status_id}/bloquear"),
        &session_cookie(fixture.admin),
        None,
    )
    .await;
    assert_eq!(location(&response), "/estados");
    let state = lifecycle::current_state(&pool, Stateful::RequestStatus, status_id)
        .await
        .unwrap();
    assert_eq!(state, Some(EntityState::Bloqueado));

    let title = unique("Estado-bloqueado");
    let form = format!(
        "survey_id={}&territorial_id={}&status_id={}&title={}",
        fixture.survey_id, fixture.territorial, status_id, title
    );
    let response = send(
        app(pool.clone()),
        Method::POST,
        "/solicitudes/crear",
        &session_cookie(fixture.admin),
        Some(form),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(request_by_title(&pool, &title).await.is_none());
}

#[tokio::test]
async fn survey_type_form_is_served_to_administrators() {
    let Some(pool) = test_pool().await else { return };
    let fixture = Fixture::build(&pool).await;

    let response = send(
        app(pool.clone()),
        Method::GET,
        "/tipos-encuesta/crear",
        &session_cookie(fixture.admin),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        app(pool),
        Method::GET,
        "/tipos-encuesta/crear",
        &session_cookie(fixture.territorial),
        None,
    )
    .await;
    assert_eq!(location(&response), "/solicitudes");
}
