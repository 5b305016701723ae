#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use stockscan_api::{
    auth::{roles, AuthService},
    config::AppConfig,
    db,
    events::{self, EventSender},
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_SECRET: &str =
    "Vq8#rT2!mZ4pLx9@Wc6^Hn1&Jd5*Kf7(Gs3)Yb0-Ue8+Ta2=Rp4~Ow6Ni9Mh1Lg3Kj5";

/// A valid EAN-13.
pub const EAN: &str = "4006381333931";

/// Full router over a throwaway SQLite file, with an admin token ready to use.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    token: String,
    _event_task: tokio::task::JoinHandle<()>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app after letting the caller tweak the configuration.
    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("stockscan_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "development".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        tweak(&mut cfg);

        let pool = db::establish_connection_with_config(&db::DbConfig::from(&cfg))
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);
        let token = state
            .auth
            .issue_token("test-admin", Some("Test Admin".into()), vec![roles::ADMIN.into()], vec![])
            .expect("mint admin token");
        let router = stockscan_api::build_router(state.clone());

        Self {
            router,
            state,
            token,
            _event_task: event_task,
            _dir: dir,
        }
    }

    pub fn auth_service(&self) -> Arc<AuthService> {
        self.state.auth.clone()
    }

    /// Access the bearer token for the default admin caller.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Mints a token for `subject` with the given roles and explicit permissions.
    pub fn token_for(&self, subject: &str, roles: &[&str], permissions: &[&str]) -> String {
        self.state
            .auth
            .issue_token(
                subject,
                None,
                roles.iter().map(|r| r.to_string()).collect(),
                permissions.iter().map(|p| p.to_string()).collect(),
            )
            .expect("mint token")
    }

    /// Send a request against the router with an optional bearer token and extra headers.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        self.send(method, uri, body, token, &[]).await
    }

    /// Convenience helper for admin JSON requests.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.send(method, uri, body, Some(self.token()), &[]).await
    }

    pub async fn request_authenticated_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        self.send(method, uri, body, Some(self.token()), headers).await
    }

    /// Creates a warehouse and returns its id.
    pub async fn seed_location(&self, code: &str) -> Uuid {
        let response = self
            .request_authenticated(
                Method::POST,
                "/api/v1/locations",
                Some(json!({
                    "code": code,
                    "name": format!("Location {}", code),
                    "location_type": "Warehouse",
                })),
            )
            .await;
        assert_eq!(response.status(), 201, "seed location");
        id_of(&response_json(response).await)
    }

    /// Creates an item with 10 units on hand and a reorder point of 3.
    pub async fn seed_item(&self, sku: &str, barcode: &str, location_id: Uuid) -> Value {
        let response = self
            .request_authenticated(
                Method::POST,
                "/api/v1/items",
                Some(json!({
                    "sku": sku,
                    "barcode": barcode,
                    "name": format!("Item {}", sku),
                    "quantity": 10,
                    "unit_cost": "12.50",
                    "reorder_point": 3,
                    "location_id": location_id,
                })),
            )
            .await;
        assert_eq!(response.status(), 201, "seed item");
        response_json(response).await["data"].clone()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Reads `data.id` (or `id`) from a response envelope.
pub fn id_of(value: &Value) -> Uuid {
    let raw = value["data"]["id"]
        .as_str()
        .or_else(|| value["id"].as_str())
        .expect("id in response");
    Uuid::parse_str(raw).expect("uuid id")
}

pub fn etag_of(response: &Response) -> String {
    response
        .headers()
        .get("etag")
        .expect("etag header")
        .to_str()
        .expect("ascii etag")
        .to_string()
}
