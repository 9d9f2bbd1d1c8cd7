//! Backend client and backend-backed sign-in against a mock server.

#![allow(clippy::unwrap_used)]

use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zync::backend::{BackendClient, BackendError, LoginRequest, RegisterRequest};
use zync::config::ApiConfig;
use zync::{ZyncApp, ZyncConfig};

fn client(server: &MockServer) -> BackendClient {
    BackendClient::new(&ApiConfig::default().with_base_url(server.uri())).unwrap()
}

fn me_body() -> serde_json::Value {
    serde_json::json!({
        "id": "42",
        "email": "ana@zync.com",
        "firstName": "Ana",
        "lastName": "Rojas",
        "zyncPoints": 300
    })
}

async fn mount_login_and_me(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(serde_json::json!({"email": "ana@zync.com", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"accessToken": "jwt-abc"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("authorization", "Bearer jwt-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(me_body()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_then_me() {
    let server = MockServer::start().await;
    mount_login_and_me(&server).await;
    let client = client(&server);

    let token = client
        .login(&LoginRequest {
            email: "ana@zync.com".to_string(),
            password: Some("hunter2".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(token, "jwt-abc");

    let user = client.me(&token).await.unwrap();
    assert_eq!(user.first_name, "Ana");
    assert_eq!(user.zync_points, 300);
}

#[tokio::test]
async fn bad_credentials_are_unauthorized_with_the_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({"message": "Invalid credentials"})),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .login(&LoginRequest {
            email: "ana@zync.com".to_string(),
            password: Some("wrong".to_string()),
        })
        .await
        .unwrap_err();

    assert_eq!(err, BackendError::Unauthorized("Invalid credentials".to_string()));
    assert_eq!(err.user_message(), "Invalid credentials");
}

#[tokio::test]
async fn validation_messages_are_joined() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "message": ["phone must be a valid phone number", "country should not be empty"]
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .register(&RegisterRequest {
            email: "ana@zync.com".to_string(),
            first_name: "Ana".to_string(),
            last_name: "Rojas".to_string(),
            ..RegisterRequest::default()
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BackendError::ApiError {
            status: 400,
            message: "phone must be a valid phone number, country should not be empty".to_string(),
        }
    );
}

#[tokio::test]
async fn missing_token_in_login_response_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let err = client(&server)
        .login(&LoginRequest {
            email: "ana@zync.com".to_string(),
            password: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err, BackendError::MissingAccessToken);
}

#[tokio::test]
async fn email_verification_posts_the_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/email/verify"))
        .and(body_json(serde_json::json!({"email": "ana@zync.com", "otp": "123456"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/email/resend"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too many requests"))
        .mount(&server)
        .await;

    let client = client(&server);
    client.verify_email("ana@zync.com", "123456").await.unwrap();

    let err = client.resend_verification("ana@zync.com").await.unwrap_err();
    assert_eq!(err.user_message(), "Too many requests");
}

#[tokio::test]
async fn connected_app_signs_in_through_the_backend() {
    let server = MockServer::start().await;
    mount_login_and_me(&server).await;

    let mut config = ZyncConfig::default();
    config.api = config.api.with_base_url(server.uri());
    let app = ZyncApp::connected(&config).unwrap();

    assert!(app.login_with_password("ana@zync.com", "hunter2").await.unwrap());
    let (name, token) = app
        .session(|s| (s.user().map(|u| u.name.clone()), s.token().map(str::to_string)))
        .await;
    assert_eq!(name.as_deref(), Some("Ana Rojas"));
    assert_eq!(token.as_deref(), Some("jwt-abc"));
}

#[tokio::test]
async fn connected_app_reports_unknown_credentials_as_false() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({"message": "Invalid credentials"})))
        .mount(&server)
        .await;

    let mut config = ZyncConfig::default();
    config.api = config.api.with_base_url(server.uri());
    let app = ZyncApp::connected(&config).unwrap();

    assert!(!app.login_with_password("ana@zync.com", "nope").await.unwrap());
    assert!(app.backend().is_some());
}
