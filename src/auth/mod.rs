/*!
 * # Authentication and Authorization Module
 *
 * Requests authenticate with an HS256 JWT in `Authorization: Bearer`.
 * Tokens are minted elsewhere (an identity provider, or `stockscan-cli
 * mint-token` for operators); this service only validates them and
 * enforces per-route permissions.
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ErrorResponse;

pub mod permissions;

pub use permissions::*;

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,              // Subject (user or device ID)
    pub name: Option<String>,     // Display name
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>, // Explicit grants on top of the roles
    pub jti: String,              // JWT ID
    pub iat: i64,                 // Issued at time
    pub exp: i64,                 // Expiration time
    pub nbf: i64,                 // Not valid before time
    pub iss: String,              // Issuer
    pub aud: String,              // Audience
}

/// Authenticated caller extracted from the JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: String,
    pub name: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub token_id: String,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// True if granted directly, through a wildcard, or through a role.
    pub fn has_permission(&self, permission: &str) -> bool {
        if self.is_admin() {
            return true;
        }
        self.permissions
            .iter()
            .any(|p| is_permission_implied(p, permission))
            || self
                .roles
                .iter()
                .any(|role| role_permissions(role).iter().any(|p| *p == permission))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(roles::ADMIN)
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            name: claims.name,
            roles: claims.roles,
            permissions: claims.permissions,
            token_id: claims.jti,
        }
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(
        jwt_secret: String,
        jwt_audience: String,
        jwt_issuer: String,
        access_token_expiration: Duration,
    ) -> Self {
        Self {
            jwt_secret,
            jwt_audience,
            jwt_issuer,
            access_token_expiration,
        }
    }
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.jwt_secret.clone(),
            cfg.auth_audience.clone(),
            cfg.auth_issuer.clone(),
            Duration::from_secs(cfg.jwt_expiration),
        )
    }
}

/// Issues and validates tokens
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Mints an access token with the configured lifetime.
    pub fn issue_token(
        &self,
        subject: &str,
        name: Option<String>,
        roles: Vec<String>,
        permissions: Vec<String>,
    ) -> Result<String, AuthError> {
        self.issue_token_with_ttl(
            subject,
            name,
            roles,
            permissions,
            self.config.access_token_expiration,
        )
    }

    pub fn issue_token_with_ttl(
        &self,
        subject: &str,
        name: Option<String>,
        roles: Vec<String>,
        permissions: Vec<String>,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(ttl)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: subject.to_string(),
            name,
            roles,
            permissions,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        self.encode_claims(&claims)
    }

    pub fn encode_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.validate_nbf = true;

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            other => {
                debug!(reason = ?other, "rejected token");
                AuthError::InvalidToken
            }
        })
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Missing token")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Token creation failed: {0}")]
    TokenCreation(String),
    #[error("Insufficient permissions")]
    InsufficientPermissions,
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Authentication required".to_string(),
            ),
            Self::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING_TOKEN",
                "No authentication token provided".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired".to_string(),
            ),
            Self::TokenCreation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_TOKEN_CREATION_FAILED",
                "Token creation failed".to_string(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions".to_string(),
            ),
            Self::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %self, "authentication failure");
        }
        let body = ErrorResponse::new(status, message, Some(error_code.to_string()));
        (status, Json(body)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Permission middleware to check if a user has the required permission
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.has_permission(&required_permission) {
        debug!(
            user_id = %user.user_id,
            permission = %required_permission,
            "permission denied"
        );
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Role middleware to check if a user has the required role
pub async fn role_middleware(
    State(required_role): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.has_role(&required_role) && !user.is_admin() {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Authentication middleware that extracts and validates auth tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return AuthError::InternalError("Authentication service not available".into())
                .into_response();
        }
    };

    match extract_auth_from_headers(request.headers(), &auth_service) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

fn extract_auth_from_headers(
    headers: &HeaderMap,
    auth_service: &AuthService,
) -> Result<AuthUser, AuthError> {
    let auth_value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuth)?
        .to_str()
        .map_err(|_| AuthError::InvalidToken)?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let claims = auth_service.validate_token(token)?;
    Ok(claims.into())
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_permission(self, permission: &str) -> Self;
    fn with_role(self, role: &str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_permission(self, permission: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            permission.to_string(),
            permission_middleware,
        ))
        .with_auth()
    }

    fn with_role(self, role: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            role.to_string(),
            role_middleware,
        ))
        .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::{body::Body, routing::get, Extension, Router};
    use tower::ServiceExt;

    fn service() -> AuthService {
        AuthService::new(AuthConfig::new(
            "k3Yp9!vQ2#wR7$tZ5^uX8&mN4*bL6(cJ1)hG0-fD3+sA9=eW2~".repeat(2),
            "stockscan-api".into(),
            "stockscan-auth".into(),
            Duration::from_secs(600),
        ))
    }

    fn user(roles: &[&str], permissions: &[&str]) -> AuthUser {
        AuthUser {
            user_id: "u-1".into(),
            name: None,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            token_id: "t-1".into(),
        }
    }

    #[test]
    fn issued_token_round_trips() {
        let auth = service();
        let token = auth
            .issue_token(
                "scanner-7",
                Some("Dock scanner".into()),
                vec!["clerk".into()],
                vec![],
            )
            .unwrap();
        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "scanner-7");
        assert_eq!(claims.roles, vec!["clerk"]);
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = service();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "u".into(),
            name: None,
            roles: vec![],
            permissions: vec![],
            jti: "j".into(),
            iat: now - 7200,
            exp: now - 3600,
            nbf: now - 7200,
            iss: "stockscan-auth".into(),
            aud: "stockscan-api".into(),
        };
        let token = auth.encode_claims(&claims).unwrap();
        assert_matches!(auth.validate_token(&token), Err(AuthError::TokenExpired));
    }

    #[test]
    fn foreign_audience_and_secret_are_rejected() {
        let auth = service();
        let mut other = service();
        other.config.jwt_audience = "someone-else".into();
        let token = other.issue_token("u", None, vec![], vec![]).unwrap();
        assert_matches!(auth.validate_token(&token), Err(AuthError::InvalidToken));

        let mut forged = service();
        forged.config.jwt_secret = "x".repeat(64);
        let token = forged.issue_token("u", None, vec![], vec![]).unwrap();
        assert_matches!(auth.validate_token(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn permissions_come_from_claims_roles_and_admin() {
        assert!(user(&[], &["items:read"]).has_permission(consts::ITEMS_READ));
        assert!(!user(&[], &["items:read"]).has_permission(consts::ITEMS_WRITE));
        assert!(user(&["clerk"], &[]).has_permission(consts::TRANSACTIONS_PROCESS));
        assert!(!user(&["clerk"], &[]).has_permission(consts::TRANSACTIONS_APPROVE));
        assert!(user(&["admin"], &[]).has_permission("anything:at-all"));
    }

    fn protected_app(auth: AuthService) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .with_permission(consts::ITEMS_READ)
            .layer(Extension(Arc::new(auth)))
    }

    async fn status_for(auth: AuthService, bearer: Option<String>) -> StatusCode {
        let mut req = axum::http::Request::builder().uri("/");
        if let Some(token) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        protected_app(auth)
            .oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn middleware_maps_missing_and_insufficient_auth() {
        let auth = service();
        assert_eq!(status_for(auth.clone(), None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(auth.clone(), Some("garbage".into())).await,
            StatusCode::UNAUTHORIZED
        );

        let no_grants = auth.issue_token("u", None, vec![], vec![]).unwrap();
        assert_eq!(
            status_for(auth.clone(), Some(no_grants)).await,
            StatusCode::FORBIDDEN
        );

        let viewer = auth
            .issue_token("u", None, vec!["viewer".into()], vec![])
            .unwrap();
        assert_eq!(status_for(auth, Some(viewer)).await, StatusCode::OK);
    }
}
