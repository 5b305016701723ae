//! StockScan API Library
//!
//! Barcode-driven inventory tracking: items, storage locations, suppliers and
//! the stock movements between them, served over a versioned REST API.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod barcode;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod rate_limiter;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use utoipa::ToSchema;

use crate::auth::consts as perm;
use crate::auth::AuthRouterExt;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub auth: Arc<auth::AuthService>,
    pub services: services::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let auth = Arc::new(auth::AuthService::new(auth::AuthConfig::from(&config)));
        let services = services::AppServices::new(db.clone(), Arc::new(event_sender.clone()));
        Self {
            db,
            config,
            event_sender,
            auth,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn from_page(page: services::Page<T>) -> Self {
        let total_pages = if page.per_page == 0 {
            0
        } else {
            page.total.div_ceil(page.per_page)
        };
        Self {
            items: page.items,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{items, locations, suppliers, transactions};

    let locations_read = Router::new()
        .route("/locations", get(locations::list_locations))
        .route("/locations/:id", get(locations::get_location))
        .route("/locations/:id/children", get(locations::location_children))
        .with_permission(perm::LOCATIONS_READ);

    let locations_write = Router::new()
        .route("/locations", post(locations::create_location))
        .route(
            "/locations/:id",
            axum::routing::put(locations::update_location).delete(locations::delete_location),
        )
        .with_permission(perm::LOCATIONS_WRITE);

    let suppliers_read = Router::new()
        .route("/suppliers", get(suppliers::list_suppliers))
        .route("/suppliers/:id", get(suppliers::get_supplier))
        .with_permission(perm::SUPPLIERS_READ);

    let suppliers_write = Router::new()
        .route("/suppliers", post(suppliers::create_supplier))
        .route(
            "/suppliers/:id",
            axum::routing::put(suppliers::update_supplier).delete(suppliers::delete_supplier),
        )
        .with_permission(perm::SUPPLIERS_WRITE);

    // Scanning is a read: the device only resolves a code to an item.
    let items_read = Router::new()
        .route("/items", get(items::list_items))
        .route("/items/low-stock", get(items::low_stock_items))
        .route("/items/barcode/:code", get(items::get_item_by_barcode))
        .route("/items/scan", post(items::scan_item))
        .route("/items/:id", get(items::get_item))
        .with_permission(perm::ITEMS_READ);

    let items_write = Router::new()
        .route("/items", post(items::create_item))
        .route(
            "/items/:id",
            axum::routing::put(items::update_item).delete(items::delete_item),
        )
        .with_permission(perm::ITEMS_WRITE);

    let items_adjust = Router::new()
        .route("/items/:id/adjust", post(items::adjust_stock))
        .with_permission(perm::ITEMS_ADJUST);

    let transactions_read = Router::new()
        .route("/transactions", get(transactions::list_transactions))
        .route("/transactions/:id", get(transactions::get_transaction))
        .with_permission(perm::TRANSACTIONS_READ);

    let transactions_create = Router::new()
        .route("/transactions", post(transactions::create_transaction))
        .route(
            "/transactions/:id/cancel",
            post(transactions::cancel_transaction),
        )
        .with_permission(perm::TRANSACTIONS_CREATE);

    let transactions_approve = Router::new()
        .route(
            "/transactions/:id/approve",
            post(transactions::approve_transaction),
        )
        .with_permission(perm::TRANSACTIONS_APPROVE);

    let transactions_process = Router::new()
        .route(
            "/transactions/:id/process",
            post(transactions::process_transaction),
        )
        .with_permission(perm::TRANSACTIONS_PROCESS);

    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(locations_read)
        .merge(locations_write)
        .merge(suppliers_read)
        .merge(suppliers_write)
        .merge(items_read)
        .merge(items_write)
        .merge(items_adjust)
        .merge(transactions_read)
        .merge(transactions_create)
        .merge(transactions_approve)
        .merge(transactions_process)
}

/// Full application router: public probes, the v1 API, Swagger UI and the
/// middleware stack. Shared by the server binary and the integration tests.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;
    let auth_service = state.auth.clone();

    let backend = match rate_limiter::RateLimitBackend::from_app_config(config) {
        Ok(backend) => backend,
        Err(err) => {
            ::tracing::warn!(
                "Redis rate limit backend unavailable ({}); counting in memory",
                err
            );
            rate_limiter::RateLimitBackend::InMemory
        }
    };
    let limiter = rate_limiter::RateLimiter::new(config.into(), backend);
    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
        runtime.spawn(rate_limiter::start_cleanup_task(
            limiter.clone(),
            limiter.config().window_duration.max(Duration::from_secs(1)) * 2,
        ));
    }
    let mut rate_limit =
        rate_limiter::RateLimitLayer::from_limiter(limiter).with_auth_service(auth_service.clone());

    if let Some(raw) = config.rate_limit_path_policies.as_deref() {
        let (policies, warnings) = rate_limiter::parse_path_policies(raw);
        for warning in &warnings {
            ::tracing::warn!("Rate limit policy configuration: {}", warning);
        }
        if !policies.is_empty() {
            ::tracing::info!("Configured {} path-based rate limit policies", policies.len());
            rate_limit = rate_limit.with_policies(policies);
        }
    }

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        // Inject AuthService into request extensions for auth middleware
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            inject_auth_service,
        ))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(CompressionLayer::new())
        .layer(rate_limit)
        .layer(cors_layer(config))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

async fn inject_auth_service(
    State(auth): State<Arc<auth::AuthService>>,
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    req.extensions_mut().insert(auth);
    next.run(req).await
}

fn cors_layer(config: &config::AppConfig) -> CorsLayer {
    let configured_origins: Option<Vec<HeaderValue>> = config
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(config.cors_allow_credentials)
    } else if config.should_allow_permissive_cors() {
        CorsLayer::permissive()
    } else {
        // Same-origin only.
        CorsLayer::new()
    }
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "service": "stockscan-api",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(State(state): State<AppState>) -> Response {
    let db_healthy = db::check_connection(&state.db).await.is_ok();
    let status = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let health_data = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "checks": {
            "database": if db_healthy { "healthy" } else { "unhealthy" },
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    (status, Json(ApiResponse::success(health_data))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        assert!(!response.success);
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
    }

    #[test]
    fn pagination_counts_pages() {
        let page = services::Page::new(vec![1, 2], 5, 1, 2);
        let paginated = PaginatedResponse::from_page(page);
        assert_eq!(paginated.total_pages, 3);

        let empty = PaginatedResponse::from_page(services::Page::<u8>::new(vec![], 0, 1, 20));
        assert_eq!(empty.total_pages, 0);
    }
}
