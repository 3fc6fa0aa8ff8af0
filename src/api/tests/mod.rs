use super::*;
use crate::forwarder::test_helpers::{MockClientProvider, MockPlatformClient, create_test_forwarder};
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;


/// Forwarder over a mock client holding text messages 0..`messages`
async fn create_test_forwarder_with(
    messages: i64,
) -> (
    Arc<ChatForwarder>,
    Arc<MockPlatformClient>,
    tempfile::TempDir,
) {
    let client = Arc::new(MockPlatformClient::with_text_messages(0..messages));
    let provider = Arc::new(MockClientProvider::new(client.clone()));
    let (forwarder, temp_dir) = create_test_forwarder(provider).await;
    (Arc::new(forwarder), client, temp_dir)
}

/// Router with the forwarder's own config
fn router_for(forwarder: &Arc<ChatForwarder>) -> Router {
    let config = forwarder.get_config();
    create_router(forwarder.clone(), config)
}

async fn json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_api_server_spawns() {
    let (forwarder, _client, _temp_dir) = create_test_forwarder_with(0).await;

    let mut config = (*forwarder.get_config()).clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let forwarder = forwarder.clone();
        async move { start_api_server(forwarder, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server should still be running");
    api_handle.abort();
}

#[tokio::test]
async fn test_cors_headers_present_when_enabled() {
    let (forwarder, _client, _temp_dir) = create_test_forwarder_with(0).await;

    let mut config = (*forwarder.get_config()).clone();
    config.api.cors_enabled = true;
    config.api.cors_origins = vec!["*".to_string()];
    let app = create_router(forwarder, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_cors_headers_absent_when_disabled() {
    let (forwarder, _client, _temp_dir) = create_test_forwarder_with(0).await;

    let mut config = (*forwarder.get_config()).clone();
    config.api.cors_enabled = false;
    let app = create_router(forwarder, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_api_key_guards_every_route() {
    let (forwarder, _client, _temp_dir) = create_test_forwarder_with(0).await;

    let mut config = (*forwarder.get_config()).clone();
    config.api.api_key = Some("test-secret-key".to_string());
    let app = create_router(forwarder, Arc::new(config));

    let response = app.clone().oneshot(get("/tasks")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/tasks")
                .header("X-Api-Key", "test-secret-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/tasks")
                .header("Authorization", "Bearer test-secret-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/tasks")
                .header("X-Api-Key", "wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_swagger_ui_toggle() {
    let (forwarder, _client, _temp_dir) = create_test_forwarder_with(0).await;

    let mut config = (*forwarder.get_config()).clone();
    config.api.swagger_ui = false;
    let app = create_router(forwarder.clone(), Arc::new(config));
    let response = app.oneshot(get("/swagger-ui/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let app = router_for(&forwarder);
    let response = app.oneshot(get("/swagger-ui/")).await.unwrap();
    assert_ne!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_cors_layer_accepts_explicit_origins() {
    // unparsable origins are skipped rather than rejected
    let _layer = build_cors_layer(&[
        "http://localhost:3000".to_string(),
        "not a header\n".to_string(),
    ]);
}
