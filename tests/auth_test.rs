use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use qrenzo::asset::DefaultAssetLoader;
use qrenzo::config::AppConfig;
use qrenzo::database::{AppState, RedbStore};
use qrenzo::encoder::QrCodeEncoder;
use qrenzo::pipeline::Renderer;
use qrenzo::route::create_app;

// Mutex to ensure tests that modify env vars don't run in parallel
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn setup_test_app(authorization: Option<&str>) -> (Router, NamedTempFile) {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = temp_db.path().to_str().unwrap();
    let state = AppState {
        store: Arc::new(RedbStore::open(db_path).expect("Failed to initialize test database")),
        renderer: Arc::new(
            Renderer::new(Arc::new(QrCodeEncoder), Arc::new(DefaultAssetLoader)).with_size(64),
        ),
        config: Arc::new(AppConfig {
            authorization: authorization.map(str::to_owned),
            ..AppConfig::default()
        }),
    };
    (create_app(state), temp_db)
}

/// Helper function to parse response body as JSON
async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

fn create_request(token: Option<&str>, code: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/links")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", token);
    }
    builder
        .body(Body::from(
            json!({ "url": "https://example.com/auth-test", "custom_code": code }).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_auth_middleware_enabled_valid_token() {
    let (app, _temp_db) = setup_test_app(Some("secret_token"));

    let response = app
        .oneshot(create_request(Some("secret_token"), "auth-1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_auth_middleware_enabled_invalid_token() {
    let (app, _temp_db) = setup_test_app(Some("secret_token"));

    let response = app
        .oneshot(create_request(Some("wrong_token"), "auth-2"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn test_auth_middleware_enabled_missing_token() {
    let (app, _temp_db) = setup_test_app(Some("secret_token"));

    let response = app.oneshot(create_request(None, "auth-3")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_middleware_disabled() {
    let (app, _temp_db) = setup_test_app(None);

    let response = app.oneshot(create_request(None, "auth-4")).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_qr_export_is_guarded() {
    let (app, _temp_db) = setup_test_app(Some("secret_token"));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/qr")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "content": "hello" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_public_redirect_needs_no_token() {
    let (app, _temp_db) = setup_test_app(Some("secret_token"));

    let response = app
        .clone()
        .oneshot(create_request(Some("secret_token"), "open"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(Request::builder().uri("/s/open").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

const CONFIG_VARS: [&str; 7] = [
    "HOST",
    "PORT",
    "DATABASE_URL",
    "BASE_URL",
    "AUTHORIZATION",
    "CANVAS_SIZE",
    "REDIRECT_DELAY_SECS",
];

fn clear_config_vars() {
    for var in CONFIG_VARS {
        env::remove_var(var);
    }
}

#[test]
fn test_config_from_env() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_config_vars();

    let config = AppConfig::from_env().unwrap();
    assert_eq!(config.port, 8080);
    assert_eq!(config.base_url, "http://localhost:8080");
    assert_eq!(config.authorization, None);
    assert_eq!(config.canvas_size, 300);
    assert_eq!(config.redirect_delay, Duration::from_secs(2));

    env::set_var("PORT", "9090");
    env::set_var("BASE_URL", "https://qrenzo.app/");
    env::set_var("AUTHORIZATION", "");
    env::set_var("CANVAS_SIZE", "10");
    env::set_var("REDIRECT_DELAY_SECS", "0");

    let config = AppConfig::from_env().unwrap();
    assert_eq!(config.port, 9090);
    assert_eq!(config.base_url, "https://qrenzo.app");
    assert_eq!(config.authorization, None);
    assert_eq!(config.canvas_size, 64);
    assert_eq!(config.redirect_delay, Duration::ZERO);

    env::set_var("PORT", "not-a-port");
    assert!(AppConfig::from_env().is_err());

    clear_config_vars();
}
