//! Integration tests: health and the REST surface (notify, broadcast,
//! presence snapshot) driven through the router in-process.
//!
//! All state is in-memory, so these run with no external services.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use presenced::auth::TokenVerifier;
use presenced::services::{ConnectionRegistry, PresenceStore, RoomManager};
use presenced::{create_app, AppState};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

const APP_KEY: &str = "test-key";

fn test_state() -> AppState {
    let registry = Arc::new(ConnectionRegistry::new(16));
    AppState {
        app_key: APP_KEY.to_string(),
        verifier: TokenVerifier::new("test-jwt-secret-min-32-chars!!".to_string()),
        presence: PresenceStore::new(),
        registry: registry.clone(),
        rooms: RoomManager::new(registry),
        grace_period: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn health_returns_ok() {
    let app = create_app(test_state());
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("ok"));
}

#[tokio::test]
async fn notify_requires_app_key() {
    let app = create_app(test_state());

    let body = serde_json::json!({ "userId": "u1", "data": { "message": "hello" } });
    let req = Request::builder()
        .method("POST")
        .uri("/api/notify")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method("POST")
        .uri("/api/notify")
        .header("content-type", "application/json")
        .header("x-app-key", APP_KEY)
        .body(Body::from(body.to_string()))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    // Unknown user is a no-op, not an error.
    assert_eq!(json.get("delivered").and_then(|v| v.as_u64()), Some(0));
}

#[tokio::test]
async fn broadcast_with_app_key_succeeds() {
    let app = create_app(test_state());

    let body = serde_json::json!({ "projectId": "p1", "entity": "task", "taskId": "t4" });
    let req = Request::builder()
        .method("POST")
        .uri("/api/broadcast")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "broadcast without key should be 401");

    let req = Request::builder()
        .method("POST")
        .uri("/api/broadcast")
        .header("content-type", "application/json")
        .header("x-app-key", APP_KEY)
        .body(Body::from(body.to_string()))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json.get("room").and_then(|v| v.as_str()), Some("project:p1"));
    assert_eq!(json.get("delivered").and_then(|v| v.as_u64()), Some(0));
}

#[tokio::test]
async fn presence_snapshot_requires_app_key_and_starts_empty() {
    let app = create_app(test_state());

    let req = Request::builder()
        .uri("/api/presence")
        .body(Body::empty())
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/api/presence")
        .header("x-app-key", APP_KEY)
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!([]));
}

#[tokio::test]
async fn notification_reaches_a_registered_connection() {
    let state = test_state();
    let (mut rx, _kick) = state.registry.register("c1", "u1").await;
    let app = create_app(state);

    let body = serde_json::json!({ "userId": "u1", "data": { "message": "ping" } });
    let req = Request::builder()
        .method("POST")
        .uri("/api/notify")
        .header("content-type", "application/json")
        .header("x-app-key", APP_KEY)
        .body(Body::from(body.to_string()))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let delivered: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(
        delivered.get("event").and_then(|v| v.as_str()),
        Some("notification")
    );
    assert_eq!(
        delivered.pointer("/data/message").and_then(|v| v.as_str()),
        Some("ping")
    );
}
