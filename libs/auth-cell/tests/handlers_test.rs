use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auth_cell::auth_routes;
use auth_cell::services::password::hash_password;
use shared_database::SupabaseClient;
use shared_models::auth::Role;
use shared_utils::jwt::validate_token;
use shared_utils::test_utils::{JwtTestUtils, MockDbResponses, TestConfig, TestUser};

fn app(test_config: &TestConfig) -> Router {
    let config = test_config.to_arc();
    let db = Arc::new(SupabaseClient::new(&config));
    auth_routes(config, db)
}

fn json_request(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn register_creates_patient_account() {
    let server = MockServer::start().await;
    let test_config = TestConfig::with_database_url(&server.uri());

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("email", "eq.new.patient@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .and(body_partial_json(json!({
            "email": "new.patient@example.com",
            "role": "patient",
            "is_active": true
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([MockDbResponses::user_row(
            41,
            "new.patient@example.com",
            Role::Patient,
            "$argon2id$stored"
        )])))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&test_config)
        .oneshot(json_request(
            "/register",
            json!({
                "email": "New.Patient@Example.com",
                "password": "Clinic2025",
                "full_name": "New Patient"
            }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["id"], 41);
    assert_eq!(body["role"], "patient");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn register_rejects_duplicate_email() {
    let server = MockServer::start().await;
    let test_config = TestConfig::with_database_url(&server.uri());

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockDbResponses::user_row(
            1,
            "taken@example.com",
            Role::Patient,
            "$argon2id$stored"
        )])))
        .mount(&server)
        .await;

    let response = app(&test_config)
        .oneshot(json_request(
            "/register",
            json!({"email": "taken@example.com", "password": "Clinic2025", "full_name": "Someone"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn register_rejects_weak_password() {
    let test_config = TestConfig::default();

    let response = app(&test_config)
        .oneshot(json_request(
            "/register",
            json!({"email": "weak@example.com", "password": "abc", "full_name": "Weak"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("at least 8 characters"));
}

#[tokio::test]
async fn register_doctor_requires_admin() {
    let test_config = TestConfig::default();
    let body = json!({
        "email": "doc@example.com",
        "password": "Clinic2025",
        "full_name": "Dr Who",
        "role": "doctor"
    });

    let response = app(&test_config)
        .oneshot(json_request("/register", body.clone(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let patient = TestUser::patient("p@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &test_config.jwt_secret, Some(1));
    let response = app(&test_config)
        .oneshot(json_request("/register", body, Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn login_issues_verifiable_token() {
    let server = MockServer::start().await;
    let test_config = TestConfig::with_database_url(&server.uri());
    let hash = hash_password("Clinic2025").unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("email", "eq.doc@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockDbResponses::user_row(
            12,
            "doc@example.com",
            Role::Doctor,
            &hash
        )])))
        .mount(&server)
        .await;

    let response = app(&test_config)
        .oneshot(json_request(
            "/login",
            json!({"email": "Doc@Example.com", "password": "Clinic2025"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(body["user"]["email"], "doc@example.com");

    let user = validate_token(body["access_token"].as_str().unwrap(), &test_config.jwt_secret).unwrap();
    assert_eq!(user.id, 12);
    assert_eq!(user.role, Role::Doctor);
}

#[tokio::test]
async fn login_failures_share_one_message() {
    let server = MockServer::start().await;
    let test_config = TestConfig::with_database_url(&server.uri());
    let hash = hash_password("Clinic2025").unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("email", "eq.known@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockDbResponses::user_row(
            3,
            "known@example.com",
            Role::Patient,
            &hash
        )])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("email", "eq.unknown@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    for email in ["known@example.com", "unknown@example.com"] {
        let response = app(&test_config)
            .oneshot(json_request(
                "/login",
                json!({"email": email, "password": "Wrong2025"}),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "Invalid email or password");
    }
}

#[tokio::test]
async fn login_rejects_disabled_account() {
    let server = MockServer::start().await;
    let test_config = TestConfig::with_database_url(&server.uri());
    let hash = hash_password("Clinic2025").unwrap();

    let mut row = MockDbResponses::user_row(5, "gone@example.com", Role::Patient, &hash);
    row["is_active"] = json!(false);
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&server)
        .await;

    let response = app(&test_config)
        .oneshot(json_request(
            "/login",
            json!({"email": "gone@example.com", "password": "Clinic2025"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn validate_and_verify_tokens() {
    let test_config = TestConfig::default();
    let user = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&user, &test_config.jwt_secret, Some(1));

    let response = app(&test_config)
        .oneshot(json_request("/validate", json!({}), Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["user_id"], user.id);
    assert_eq!(body["role"], "admin");

    let expired = JwtTestUtils::create_expired_token(&user, &test_config.jwt_secret);
    let response = app(&test_config)
        .oneshot(json_request("/validate", json!({}), Some(&expired)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app(&test_config)
        .oneshot(json_request("/verify", json!({}), Some(&expired)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["valid"], false);

    let response = app(&test_config)
        .oneshot(json_request("/verify", json!({}), None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["valid"], false);

    let response = app(&test_config)
        .oneshot(json_request("/verify", json!({}), Some(&token)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["valid"], true);
}

#[tokio::test]
async fn me_returns_stored_profile() {
    let server = MockServer::start().await;
    let test_config = TestConfig::with_database_url(&server.uri());
    let user = TestUser::with_id(77, "me@example.com", Role::Patient);
    let token = JwtTestUtils::create_test_token(&user, &test_config.jwt_secret, Some(1));

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", "eq.77"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockDbResponses::user_row(
            77,
            "me@example.com",
            Role::Patient,
            "$argon2id$stored"
        )])))
        .mount(&server)
        .await;

    let response = app(&test_config)
        .oneshot(
            Request::builder()
                .uri("/me")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], 77);
    assert_eq!(body["full_name"], "Test User");
}
