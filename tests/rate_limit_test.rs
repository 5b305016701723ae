//! Request budgets enforced by the rate limiting layer.

mod common;

use axum::http::Method;
use common::{response_json, TestApp, EAN};
use serde_json::json;
use stockscan_api::auth::roles;

#[tokio::test]
async fn budget_exhaustion_returns_429_with_headers() {
    let app = TestApp::with_config(|cfg| cfg.rate_limit_requests_per_window = 3).await;

    for remaining in ["2", "1", "0"] {
        let response = app
            .request_authenticated(Method::GET, "/api/v1/locations", None)
            .await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
        assert_eq!(response.headers()["x-ratelimit-remaining"], remaining);
    }

    let response = app
        .request_authenticated(Method::GET, "/api/v1/locations", None)
        .await;
    assert_eq!(response.status(), 429);
    assert!(response.headers().contains_key("retry-after"));
    let body = response_json(response).await;
    assert_eq!(body["error"], "Too Many Requests");
}

#[tokio::test]
async fn callers_have_separate_budgets() {
    let app = TestApp::with_config(|cfg| cfg.rate_limit_requests_per_window = 1).await;
    let other = app.token_for("viewer-2", &[roles::VIEWER], &[]);

    let response = app
        .request_authenticated(Method::GET, "/api/v1/locations", None)
        .await;
    assert_eq!(response.status(), 200);
    let response = app
        .request_authenticated(Method::GET, "/api/v1/locations", None)
        .await;
    assert_eq!(response.status(), 429);

    let response = app
        .request(Method::GET, "/api/v1/locations", None, Some(&other))
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn health_probe_is_never_limited() {
    let app = TestApp::with_config(|cfg| cfg.rate_limit_requests_per_window = 1).await;
    for _ in 0..5 {
        let response = app.request(Method::GET, "/health", None, None).await;
        assert_eq!(response.status(), 200);
    }
}

#[tokio::test]
async fn path_policy_applies_its_own_budget() {
    let app = TestApp::with_config(|cfg| {
        cfg.rate_limit_requests_per_window = 50;
        cfg.rate_limit_path_policies = Some("/api/v1/items/scan:1:60".into());
    })
    .await;
    let location = app.seed_location("WH-1").await;
    app.seed_item("SKU-1", EAN, location).await;

    let scan = || {
        app.request_authenticated(
            Method::POST,
            "/api/v1/items/scan",
            Some(json!({ "barcode": EAN })),
        )
    };
    assert_eq!(scan().await.status(), 200);
    assert_eq!(scan().await.status(), 429);

    let response = app
        .request_authenticated(Method::GET, "/api/v1/items", None)
        .await;
    assert_eq!(response.status(), 200);
}
