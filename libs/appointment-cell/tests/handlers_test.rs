use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::router::appointment_routes;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseRows, TestConfig, TestUser};

async fn mock_backend() -> (MockServer, TestConfig) {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    (mock_server, config)
}

fn staff_token(config: &TestConfig) -> String {
    let user = TestUser::staff("frontdesk@example.com");
    JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(24))
}

async fn send(
    app: axum::Router,
    req_method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(req_method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let request = builder
        .body(match body {
            Some(json) => Body::from(json.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&bytes).unwrap_or(json!({}))
    };
    (status, json)
}

#[tokio::test]
async fn test_requests_without_token_are_unauthorized() {
    let (_mock_server, config) = mock_backend().await;
    let app = appointment_routes(config.to_arc());

    let (status, _) = send(app, Method::GET, "/APT-2025-000001", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_get_appointment_includes_allowed_next_statuses() {
    let (mock_server, config) = mock_backend().await;
    let start = Utc::now() + Duration::hours(48);
    let end = start + Duration::minutes(30);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("code", "eq.APT-2025-000001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseRows::appointment_row("APT-2025-000001", "scheduled", start, end),
        ]))
        .mount(&mock_server)
        .await;

    let token = staff_token(&config);
    let app = appointment_routes(config.to_arc());

    let (status, body) = send(app, Method::GET, "/APT-2025-000001", Some(&token), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(
        body["allowed_next_statuses"],
        json!(["checked_in", "cancelled", "no_show"])
    );
}

#[tokio::test]
async fn test_get_unknown_appointment_is_404() {
    let (mock_server, config) = mock_backend().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<Value>::new()))
        .mount(&mock_server)
        .await;

    let token = staff_token(&config);
    let app = appointment_routes(config.to_arc());

    let (status, _) = send(app, Method::GET, "/APT-2025-999999", Some(&token), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_audit_trail_round_trip() {
    let (mock_server, config) = mock_backend().await;
    let start = Utc::now() + Duration::hours(1);
    let end = start + Duration::minutes(30);
    let appointment = MockSupabaseRows::appointment_row("APT-2025-000002", "cancelled", start, end);
    let appt_id = appointment["id"].clone();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("code", "eq.APT-2025-000002"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_audit_log"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![json!({
            "id": Uuid::new_v4(),
            "appointment_id": appt_id,
            "performed_by": Uuid::new_v4(),
            "action": "status_change",
            "reason_code": "patient_request",
            "old_status": "scheduled",
            "new_status": "cancelled",
            "note": null,
            "created_at": "2025-06-01T09:00:00Z"
        })]))
        .mount(&mock_server)
        .await;

    let token = staff_token(&config);
    let app = appointment_routes(config.to_arc());

    let (status, body) = send(
        app,
        Method::GET,
        "/APT-2025-000002/audit",
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);
    assert_eq!(body["entries"][0]["reason_code"], json!("patient_request"));
}

#[tokio::test]
async fn test_cancellation_without_reason_is_bad_request() {
    let (mock_server, config) = mock_backend().await;
    let start = Utc::now() + Duration::hours(48);
    let end = start + Duration::minutes(30);

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointment_locks"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointment_locks"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseRows::appointment_row("APT-2025-000003", "scheduled", start, end),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let token = staff_token(&config);
    let app = appointment_routes(config.to_arc());

    let (status, _) = send(
        app,
        Method::POST,
        "/APT-2025-000003/status",
        Some(&token),
        Some(json!({ "status": "cancelled" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_late_cancellation_is_conflict() {
    let (mock_server, config) = mock_backend().await;
    // Two hours out: inside the 24h notice window whatever the wall clock
    let start = Utc::now() + Duration::hours(2);
    let end = start + Duration::minutes(30);

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointment_locks"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointment_locks"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseRows::appointment_row("APT-2025-000005", "scheduled", start, end),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let token = staff_token(&config);
    let app = appointment_routes(config.to_arc());

    let (status, body) = send(
        app,
        Method::POST,
        "/APT-2025-000005/status",
        Some(&token),
        Some(json!({ "status": "cancelled", "reason_code": "patient_request" })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("notice"));
}

#[tokio::test]
async fn test_transition_out_of_terminal_status_is_conflict() {
    let (mock_server, config) = mock_backend().await;
    let start = Utc::now() - Duration::hours(1);
    let end = start + Duration::minutes(30);

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointment_locks"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointment_locks"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseRows::appointment_row("APT-2025-000004", "completed", start, end),
        ]))
        .mount(&mock_server)
        .await;

    let token = staff_token(&config);
    let app = appointment_routes(config.to_arc());

    let (status, _) = send(
        app,
        Method::POST,
        "/APT-2025-000004/status",
        Some(&token),
        Some(json!({ "status": "checked_in" })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}
