//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{body_json, get, FakeProvider};
use tower::ServiceExt;

fn app() -> axum::Router {
    common::build_test_app(Arc::new(FakeProvider::new(&[], "pending")))
}

// ---------------------------------------------------------------------------
// Test: GET / returns 200 with the service banner
// ---------------------------------------------------------------------------

#[tokio::test]
async fn root_returns_ok_with_json() {
    let response = get(app(), "/").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["message"], "Upscayl API Service");
    assert!(json["version"].is_string());
}

// ---------------------------------------------------------------------------
// Test: GET /health is an alias of GET /
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_alias_returns_ok() {
    let response = get(app(), "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

// ---------------------------------------------------------------------------
// Test: Health does not touch the provider
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_does_not_call_provider() {
    let provider = Arc::new(FakeProvider::new(&[], "pending"));
    let app = common::build_test_app(provider.clone());

    let response = get(app, "/").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(provider.starts(), 0);
    assert_eq!(provider.polls(), 0);
}

// ---------------------------------------------------------------------------
// Test: Unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let response = get(app(), "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: x-request-id header is present in response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let response = get(app(), "/").await;

    assert_eq!(response.status(), StatusCode::OK);

    let request_id = response.headers().get("x-request-id");
    assert!(
        request_id.is_some(),
        "Response must contain an x-request-id header"
    );

    // The value should be a valid UUID (36 chars with hyphens).
    let id_str = request_id.unwrap().to_str().unwrap();
    assert_eq!(id_str.len(), 36, "x-request-id should be a UUID string");
}

// ---------------------------------------------------------------------------
// Test: CORS preflight allows any origin by default
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cors_preflight_allows_any_origin() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/upscale/images")
        .header("Origin", "http://example.test")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    let allow_origin = headers
        .get("access-control-allow-origin")
        .expect("Missing Access-Control-Allow-Origin header")
        .to_str()
        .unwrap();
    assert_eq!(allow_origin, "*");

    let allow_methods = headers
        .get("access-control-allow-methods")
        .expect("Missing Access-Control-Allow-Methods header")
        .to_str()
        .unwrap();
    assert!(
        allow_methods.contains("POST"),
        "Allow-Methods should contain POST, got: {allow_methods}"
    );
}

// ---------------------------------------------------------------------------
// Test: An explicit origin list echoes the matching origin
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cors_origin_list_echoes_allowed_origin() {
    let mut config = common::test_config();
    config.cors_origins = vec!["http://localhost:5173".to_string()];
    let app = common::build_test_app_with(Arc::new(FakeProvider::new(&[], "pending")), config);

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/upscale/images")
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "x-api-key")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:5173"
    );
    assert_eq!(response.headers()["access-control-allow-credentials"], "true");
}
