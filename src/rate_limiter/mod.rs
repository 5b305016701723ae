/*!
 * # Rate Limiting Module
 *
 * Fixed-window request limiting for the API.
 *
 * Requests are keyed by authenticated subject when a valid bearer token is
 * present, otherwise by client IP. Path policies (`prefix:limit:window_secs`)
 * give selected endpoints, such as the scan endpoint hammered by handheld
 * devices, their own budget.
 *
 * Counters live in a `DashMap`, or in Redis when several API instances
 * must share a budget. Redis failures fall back to the local map.
 *
 * ## Usage
 *
 * ```ignore
 * let config = RateLimitConfig {
 *     requests_per_window: 100,
 *     window_duration: Duration::from_secs(60),
 *     ..Default::default()
 * };
 *
 * let app = Router::new()
 *     .route("/", get(handler))
 *     .layer(RateLimitLayer::new(config, RateLimitBackend::InMemory));
 * ```
 */
use axum::{
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, HeaderValue, Response},
    response::IntoResponse,
};
use dashmap::DashMap;
use metrics::counter;
use redis::AsyncCommands;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::{AuthService, AuthUser};
use crate::config::AppConfig;
use crate::errors::ServiceError;

fn num_to_header_value<T: ToString>(n: T) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded")]
    LimitExceeded,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl RateLimitEntry {
    fn new(window: Duration) -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
            window,
        }
    }

    /// Starts a fresh window once the current one has elapsed.
    fn roll(&mut self, window: Duration) {
        self.window = window;
        let now = Instant::now();
        if now.duration_since(self.window_start) >= window {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn is_expired(&self) -> bool {
        self.window_start.elapsed() >= self.window
    }

    fn time_until_reset(&self) -> Duration {
        self.window.saturating_sub(self.window_start.elapsed())
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
    pub enable_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_duration: Duration::from_secs(60),
            enable_headers: true,
        }
    }
}

impl From<&AppConfig> for RateLimitConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            requests_per_window: cfg.rate_limit_requests_per_window,
            window_duration: Duration::from_secs(cfg.rate_limit_window_seconds),
            enable_headers: cfg.rate_limit_enable_headers,
        }
    }
}

#[derive(Clone, Default)]
pub enum RateLimitBackend {
    #[default]
    InMemory,
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
    },
}

impl RateLimitBackend {
    /// Picks the backend named by the configuration.
    pub fn from_app_config(cfg: &AppConfig) -> Result<Self, RateLimitError> {
        if !cfg.rate_limit_use_redis {
            return Ok(Self::InMemory);
        }
        let client = redis::Client::open(cfg.redis_url.as_str())?;
        Ok(Self::Redis {
            client: Arc::new(client),
            namespace: cfg.rate_limit_namespace.clone(),
        })
    }
}

#[derive(Clone)]
enum RateLimitStore {
    InMemory {
        entries: Arc<DashMap<String, RateLimitEntry>>,
    },
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
        fallback: Arc<DashMap<String, RateLimitEntry>>,
    },
}

#[derive(Clone)]
pub struct RateLimiter {
    store: RateLimitStore,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, backend: RateLimitBackend) -> Self {
        let store = match backend {
            RateLimitBackend::InMemory => RateLimitStore::InMemory {
                entries: Arc::new(DashMap::new()),
            },
            RateLimitBackend::Redis { client, namespace } => RateLimitStore::Redis {
                client,
                namespace,
                fallback: Arc::new(DashMap::new()),
            },
        };

        Self { store, config }
    }

    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(config, RateLimitBackend::InMemory)
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub async fn check_rate_limit(&self, key: &str) -> RateLimitResult {
        self.check_with_config(key, &self.config).await
    }

    async fn check_with_config(&self, key: &str, config: &RateLimitConfig) -> RateLimitResult {
        match &self.store {
            RateLimitStore::InMemory { entries } => Self::check_in_memory(entries, key, config),
            RateLimitStore::Redis {
                client,
                namespace,
                fallback,
            } => match client.get_async_connection().await {
                Ok(mut conn) => {
                    match Self::check_with_redis(&mut conn, namespace, key, config).await {
                        Ok(result) => result,
                        Err(err) => {
                            warn!("Redis rate limit error: {}", err);
                            Self::check_in_memory(fallback, key, config)
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "Failed to connect to Redis for rate limiting, using fallback: {}",
                        err
                    );
                    Self::check_in_memory(fallback, key, config)
                }
            },
        }
    }

    fn check_in_memory(
        entries: &DashMap<String, RateLimitEntry>,
        key: &str,
        config: &RateLimitConfig,
    ) -> RateLimitResult {
        let mut entry = entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry::new(config.window_duration));
        entry.roll(config.window_duration);

        if entry.count >= config.requests_per_window {
            return RateLimitResult {
                allowed: false,
                limit: config.requests_per_window,
                remaining: 0,
                reset_time: entry.time_until_reset(),
            };
        }

        entry.count += 1;
        RateLimitResult {
            allowed: true,
            limit: config.requests_per_window,
            remaining: config.requests_per_window - entry.count,
            reset_time: entry.time_until_reset(),
        }
    }

    async fn check_with_redis<C>(
        conn: &mut C,
        namespace: &str,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, redis::RedisError>
    where
        C: redis::aio::ConnectionLike + Send,
    {
        let redis_key = format!("{}:{}", namespace, key);
        let limit = i64::from(config.requests_per_window);
        let window_secs = config.window_duration.as_secs().max(1);

        let count: i64 = conn.incr(&redis_key, 1).await?;
        if count == 1 {
            let _: Result<(), _> = conn.expire(&redis_key, window_secs as usize).await;
        }

        let ttl_secs = match conn.ttl::<_, i64>(&redis_key).await {
            Ok(ttl) if ttl > 0 => ttl as u64,
            _ => {
                // Key without expiry; a previous EXPIRE was lost.
                let _: Result<(), _> = conn.expire(&redis_key, window_secs as usize).await;
                window_secs
            }
        };

        let allowed = count <= limit;
        let remaining = if allowed {
            config
                .requests_per_window
                .saturating_sub(u32::try_from(count).unwrap_or(u32::MAX))
        } else {
            0
        };

        Ok(RateLimitResult {
            allowed,
            limit: config.requests_per_window,
            remaining,
            reset_time: Duration::from_secs(ttl_secs),
        })
    }

    pub async fn reset(&self, key: &str) {
        match &self.store {
            RateLimitStore::InMemory { entries } => {
                entries.remove(key);
            }
            RateLimitStore::Redis {
                client,
                namespace,
                fallback,
            } => {
                let redis_key = format!("{}:{}", namespace, key);
                match client.get_async_connection().await {
                    Ok(mut conn) => {
                        let _: Result<(), _> = conn.del(&redis_key).await;
                    }
                    Err(err) => {
                        warn!("Failed to reset Redis quota for {}: {}", key, err);
                    }
                }
                fallback.remove(key);
            }
        }
    }

    /// Drops entries whose own window has elapsed.
    pub fn cleanup_expired(&self) {
        let entries = match &self.store {
            RateLimitStore::InMemory { entries } => entries,
            RateLimitStore::Redis { fallback, .. } => fallback,
        };
        entries.retain(|_, entry| !entry.is_expired());
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathPolicy {
    pub prefix: String,
    pub requests_per_window: u32,
    pub window_duration: Duration,
}

pub fn extract_ip_key(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(ip) = forwarded_str.split(',').next() {
                return format!("ip:{}", ip.trim());
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return format!("ip:{}", ip_str.trim());
        }
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return format!("ip:{}", addr.ip());
    }

    "ip:unknown".to_string()
}

/// Rate limit key for an authenticated caller, if the request carries one.
pub fn extract_user_key(request: &Request, auth_service: Option<&AuthService>) -> Option<String> {
    if let Some(auth_user) = request.extensions().get::<AuthUser>() {
        return Some(format!("user:{}", auth_user.user_id));
    }

    let service = auth_service?;
    let raw = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ").map(str::trim)?;
    service
        .validate_token(token)
        .ok()
        .map(|claims| format!("user:{}", claims.sub))
}

fn apply_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert("X-RateLimit-Limit", num_to_header_value(result.limit));
    headers.insert(
        "X-RateLimit-Remaining",
        num_to_header_value(result.remaining),
    );
    headers.insert(
        "X-RateLimit-Reset",
        num_to_header_value(result.reset_time.as_secs()),
    );
}

fn is_exempt(path: &str) -> bool {
    path.starts_with("/health")
        || path.starts_with("/api/v1/health")
        || path.starts_with("/swagger-ui")
        || path.starts_with("/api-docs")
}

#[derive(Clone)]
pub struct RateLimitLayer {
    rate_limiter: RateLimiter,
    path_policies: Arc<Vec<PathPolicy>>,
    auth_service: Option<Arc<AuthService>>,
}

impl RateLimitLayer {
    pub fn new(config: RateLimitConfig, backend: RateLimitBackend) -> Self {
        Self::from_limiter(RateLimiter::new(config, backend))
    }

    pub fn from_limiter(rate_limiter: RateLimiter) -> Self {
        Self {
            rate_limiter,
            path_policies: Arc::new(Vec::new()),
            auth_service: None,
        }
    }

    pub fn with_policies(mut self, policies: Vec<PathPolicy>) -> Self {
        self.path_policies = Arc::new(policies);
        self
    }

    pub fn with_auth_service(mut self, auth_service: Arc<AuthService>) -> Self {
        self.auth_service = Some(auth_service);
        self
    }
}

impl<S> tower::Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            rate_limiter: self.rate_limiter.clone(),
            path_policies: self.path_policies.clone(),
            auth_service: self.auth_service.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    rate_limiter: RateLimiter,
    path_policies: Arc<Vec<PathPolicy>>,
    auth_service: Option<Arc<AuthService>>,
}

impl<S> tower::Service<Request> for RateLimitService<S>
where
    S: tower::Service<Request, Response = Response<axum::body::Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<axum::body::Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let rate_limiter = self.rate_limiter.clone();
        let policies = self.path_policies.clone();
        let auth_service = self.auth_service.clone();
        // Take the service that was driven to readiness, leave a clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let path = request.uri().path().to_string();
            if is_exempt(&path) {
                return inner.call(request).await;
            }

            let (key, key_type) = match extract_user_key(&request, auth_service.as_deref()) {
                Some(user_key) => (user_key, "user"),
                None => (extract_ip_key(&request), "ip"),
            };

            let policy = policies.iter().find(|p| path.starts_with(&p.prefix));
            let (bucket, config) = match policy {
                Some(p) => (
                    format!("{}|{}", key, p.prefix),
                    RateLimitConfig {
                        requests_per_window: p.requests_per_window,
                        window_duration: p.window_duration,
                        enable_headers: rate_limiter.config.enable_headers,
                    },
                ),
                None => (key, rate_limiter.config.clone()),
            };

            let result = rate_limiter.check_with_config(&bucket, &config).await;

            if !result.allowed {
                warn!(key = %bucket, path = %path, "Rate limit exceeded");
                counter!("rate_limit_denied_total", 1, "key_type" => key_type);

                let mut response = ServiceError::RateLimitExceeded.into_response();
                if config.enable_headers {
                    apply_headers(response.headers_mut(), &result);
                    response.headers_mut().insert(
                        header::RETRY_AFTER,
                        num_to_header_value(result.reset_time.as_secs().max(1)),
                    );
                }
                return Ok(response);
            }

            debug!(key = %bucket, remaining = result.remaining, "rate limit check passed");
            counter!("rate_limit_allowed_total", 1, "key_type" => key_type);

            let mut response = inner.call(request).await?;
            if config.enable_headers {
                apply_headers(response.headers_mut(), &result);
            }
            Ok(response)
        })
    }
}

/// Periodically evicts idle counters.
pub async fn start_cleanup_task(rate_limiter: RateLimiter, interval: Duration) {
    let mut interval_timer = tokio::time::interval(interval);

    loop {
        interval_timer.tick().await;
        rate_limiter.cleanup_expired();
        debug!("Rate limiter cleanup completed");
    }
}

/// Errors that can occur when parsing rate limit policy strings
#[derive(Debug, Error)]
pub enum PolicyParseError {
    #[error("Invalid policy format for '{spec}': expected 'path:limit:window_secs', got {parts} parts")]
    InvalidFormat { spec: String, parts: usize },

    #[error("Invalid limit value '{value}' in policy '{spec}': {reason}")]
    InvalidLimit {
        spec: String,
        value: String,
        reason: String,
    },

    #[error("Invalid window duration '{value}' in policy '{spec}': {reason}")]
    InvalidWindow {
        spec: String,
        value: String,
        reason: String,
    },

    #[error("Empty policy specification")]
    EmptySpec,

    #[error("Path policy must start with '/': got '{path}'")]
    InvalidPathFormat { path: String },

    #[error("Window duration must be at least 1 second, got {window_secs}")]
    WindowTooSmall { window_secs: u64 },

    #[error("Limit must be at least 1, got {limit}")]
    LimitTooSmall { limit: u32 },
}

/// Parse a path policy specification string.
///
/// Format: "path:limit:window_secs"
/// Example: "/api/v1/items/scan:600:60"
pub fn parse_path_policy(spec: &str) -> Result<PathPolicy, PolicyParseError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(PolicyParseError::EmptySpec);
    }

    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 3 {
        return Err(PolicyParseError::InvalidFormat {
            spec: spec.to_string(),
            parts: parts.len(),
        });
    }

    let path = parts[0].trim();
    if !path.starts_with('/') {
        return Err(PolicyParseError::InvalidPathFormat {
            path: path.to_string(),
        });
    }

    let limit: u32 = parts[1]
        .trim()
        .parse()
        .map_err(|e| PolicyParseError::InvalidLimit {
            spec: spec.to_string(),
            value: parts[1].to_string(),
            reason: format!("{}", e),
        })?;

    if limit < 1 {
        return Err(PolicyParseError::LimitTooSmall { limit });
    }

    let window_secs: u64 =
        parts[2]
            .trim()
            .parse()
            .map_err(|e| PolicyParseError::InvalidWindow {
                spec: spec.to_string(),
                value: parts[2].to_string(),
                reason: format!("{}", e),
            })?;

    if window_secs < 1 {
        return Err(PolicyParseError::WindowTooSmall { window_secs });
    }

    Ok(PathPolicy {
        prefix: path.to_string(),
        requests_per_window: limit,
        window_duration: Duration::from_secs(window_secs),
    })
}

/// Parse comma-separated path policies, collecting a warning per rejected entry.
pub fn parse_path_policies(policies_str: &str) -> (Vec<PathPolicy>, Vec<String>) {
    let mut policies = Vec::new();
    let mut warnings = Vec::new();

    for spec in policies_str
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
    {
        match parse_path_policy(spec) {
            Ok(policy) => policies.push(policy),
            Err(e) => warnings.push(format!("Skipping invalid path policy '{}': {}", spec, e)),
        }
    }

    // Longest prefix wins.
    policies.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
    (policies, warnings)
}

#[cfg(test)]
mod policy_parsing_tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_valid_path_policy() {
        let policy = parse_path_policy("/api/v1/items/scan:600:60").unwrap();
        assert_eq!(policy.prefix, "/api/v1/items/scan");
        assert_eq!(policy.requests_per_window, 600);
        assert_eq!(policy.window_duration, Duration::from_secs(60));
    }

    #[test]
    fn test_parse_path_policy_with_spaces() {
        let policy = parse_path_policy("  /api/v1/items : 100 : 60  ").unwrap();
        assert_eq!(policy.prefix, "/api/v1/items");
        assert_eq!(policy.requests_per_window, 100);
    }

    #[test]
    fn test_parse_path_policy_rejections() {
        assert_matches!(
            parse_path_policy("/api/v1/items:100"),
            Err(PolicyParseError::InvalidFormat { .. })
        );
        assert_matches!(
            parse_path_policy("api/v1/items:100:60"),
            Err(PolicyParseError::InvalidPathFormat { .. })
        );
        assert_matches!(
            parse_path_policy("/api:abc:60"),
            Err(PolicyParseError::InvalidLimit { .. })
        );
        assert_matches!(
            parse_path_policy("/api:0:60"),
            Err(PolicyParseError::LimitTooSmall { .. })
        );
        assert_matches!(
            parse_path_policy("/api:100:0"),
            Err(PolicyParseError::WindowTooSmall { .. })
        );
    }

    #[test]
    fn test_parse_multiple_path_policies() {
        let (policies, warnings) = parse_path_policies(
            "/api/v1/items:100:60,/api/v1/items/scan:600:60,invalid,/api/v1/transactions:50:30",
        );
        assert_eq!(policies.len(), 3);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("invalid"));

        let chosen = |path: &str| {
            policies
                .iter()
                .find(|p| path.starts_with(&p.prefix))
                .map(|p| p.prefix.as_str())
        };
        assert_eq!(chosen("/api/v1/items/scan"), Some("/api/v1/items/scan"));
        assert_eq!(chosen("/api/v1/items/42"), Some("/api/v1/items"));
        assert_eq!(chosen("/api/v1/transactions/7/process"), Some("/api/v1/transactions"));
        assert_eq!(chosen("/api/v1/locations"), None);
    }
}

#[cfg(test)]
mod limiter_tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    fn limited(n: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_window: n,
            window_duration: Duration::from_secs(60),
            enable_headers: true,
        }
    }

    #[tokio::test]
    async fn allows_exactly_the_configured_number() {
        let limiter = RateLimiter::in_memory(limited(3));

        for expected_remaining in [2, 1, 0] {
            let result = limiter.check_rate_limit("ip:10.0.0.1").await;
            assert!(result.allowed);
            assert_eq!(result.remaining, expected_remaining);
        }
        assert!(!limiter.check_rate_limit("ip:10.0.0.1").await.allowed);
        assert!(limiter.check_rate_limit("ip:10.0.0.2").await.allowed);
    }

    #[tokio::test]
    async fn reset_clears_the_window() {
        let limiter = RateLimiter::in_memory(limited(1));
        assert!(limiter.check_rate_limit("user:a").await.allowed);
        assert!(!limiter.check_rate_limit("user:a").await.allowed);

        limiter.reset("user:a").await;
        assert!(limiter.check_rate_limit("user:a").await.allowed);
    }

    #[tokio::test]
    async fn elapsed_window_starts_over() {
        let limiter = RateLimiter::in_memory(RateLimitConfig {
            requests_per_window: 1,
            window_duration: Duration::from_millis(20),
            enable_headers: true,
        });
        assert!(limiter.check_rate_limit("k").await.allowed);
        assert!(!limiter.check_rate_limit("k").await.allowed);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check_rate_limit("k").await.allowed);
    }

    #[tokio::test]
    async fn cleanup_keeps_buckets_with_longer_windows() {
        let limiter = RateLimiter::in_memory(RateLimitConfig {
            requests_per_window: 10,
            window_duration: Duration::from_millis(20),
            enable_headers: true,
        });
        let hourly = RateLimitConfig {
            requests_per_window: 1,
            window_duration: Duration::from_secs(3600),
            enable_headers: true,
        };

        assert!(limiter.check_with_config("scan:ip:1", &hourly).await.allowed);
        assert!(!limiter.check_with_config("scan:ip:1", &hourly).await.allowed);
        assert!(limiter.check_rate_limit("ip:1").await.allowed);

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.cleanup_expired();

        assert!(!limiter.check_with_config("scan:ip:1", &hourly).await.allowed);
        assert_eq!(limiter.check_rate_limit("ip:1").await.remaining, 9);
    }

    #[tokio::test]
    async fn layer_rejects_with_429_and_headers() {
        let app = Router::new()
            .route("/api/v1/items", get(|| async { "ok" }))
            .route("/health", get(|| async { "up" }))
            .layer(RateLimitLayer::new(limited(1), RateLimitBackend::InMemory));

        let request = || {
            axum::http::Request::builder()
                .uri("/api/v1/items")
                .header("x-forwarded-for", "192.0.2.7")
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), axum::http::StatusCode::OK);
        assert_eq!(first.headers()["X-RateLimit-Remaining"], "0");

        let second = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(second.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()["X-RateLimit-Limit"], "1");
        assert!(second.headers().contains_key(header::RETRY_AFTER));

        for _ in 0..3 {
            let health = app
                .clone()
                .oneshot(
                    axum::http::Request::builder()
                        .uri("/health")
                        .header("x-forwarded-for", "192.0.2.7")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(health.status(), axum::http::StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn path_policy_uses_its_own_budget() {
        let app = Router::new()
            .route("/api/v1/items", get(|| async { "ok" }))
            .route("/api/v1/items/scan", get(|| async { "ok" }))
            .layer(
                RateLimitLayer::new(limited(1), RateLimitBackend::InMemory).with_policies(vec![
                    PathPolicy {
                        prefix: "/api/v1/items/scan".into(),
                        requests_per_window: 3,
                        window_duration: Duration::from_secs(60),
                    },
                ]),
            );

        let call = |uri: &'static str| {
            app.clone().oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .header("x-real-ip", "192.0.2.9")
                    .body(Body::empty())
                    .unwrap(),
            )
        };

        assert_eq!(call("/api/v1/items").await.unwrap().status(), 200);
        for _ in 0..3 {
            assert_eq!(call("/api/v1/items/scan").await.unwrap().status(), 200);
        }
        assert_eq!(call("/api/v1/items/scan").await.unwrap().status(), 429);
        assert_eq!(call("/api/v1/items").await.unwrap().status(), 429);
    }
}
