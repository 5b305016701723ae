use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use utoipa::IntoParams;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::ApiResponse;

/// JSON body extractor whose rejections use the service error body (400).
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ServiceError {
    ServiceError::BadRequest(rejection.body_text())
}

/// Page selection accepted by every list endpoint.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, IntoParams)]
pub struct PaginationParams {
    /// 1-based page number
    pub page: Option<u64>,
    /// Rows per page, capped by `api_max_page_size`
    pub per_page: Option<u64>,
}

impl PaginationParams {
    /// Page and page size, rejecting pages whose row offset cannot be addressed.
    pub fn resolve(self, config: &AppConfig) -> Result<(u64, u64), ServiceError> {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = config.page_size(self.per_page);
        let offset = (page - 1).checked_mul(per_page);
        match offset {
            Some(offset) if offset <= i64::MAX as u64 => Ok((page, per_page)),
            _ => Err(ServiceError::BadRequest(format!(
                "page {} is out of range",
                page
            ))),
        }
    }
}

/// Strong entity tag for a row version.
pub fn etag(version: i32) -> HeaderValue {
    HeaderValue::from_str(&format!("\"{}\"", version))
        .unwrap_or_else(|_| HeaderValue::from_static("\"0\""))
}

/// Reads `If-Match` as a row version.
///
/// Absent or `*` means "whatever is current". Weak tags (`W/"3"`), quoted
/// tags and bare integers are accepted; anything else is a 400.
pub fn parse_if_match(headers: &HeaderMap) -> Result<Option<i32>, ServiceError> {
    let Some(raw) = headers.get(header::IF_MATCH) else {
        return Ok(None);
    };
    let raw = raw
        .to_str()
        .map_err(|_| ServiceError::BadRequest("If-Match header is not ASCII".to_string()))?
        .trim();

    if raw == "*" {
        return Ok(None);
    }

    let tag = raw.strip_prefix("W/").unwrap_or(raw);
    let tag = tag
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(tag);

    tag.parse::<i32>()
        .map(Some)
        .map_err(|_| ServiceError::BadRequest(format!("If-Match '{}' is not a known entity tag", raw)))
}

/// JSON envelope with an `ETag` for the row's version.
pub fn versioned<T: Serialize>(status: StatusCode, version: i32, data: T) -> Response {
    let mut response = (status, Json(ApiResponse::success(data))).into_response();
    response.headers_mut().insert(header::ETAG, etag(version));
    response
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn headers(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(header::IF_MATCH, HeaderValue::from_str(value).unwrap());
        map
    }

    #[rstest]
    #[case("\"3\"", Some(3))]
    #[case("W/\"3\"", Some(3))]
    #[case("7", Some(7))]
    #[case(" \"12\" ", Some(12))]
    #[case("*", None)]
    fn if_match_forms(#[case] value: &str, #[case] expected: Option<i32>) {
        assert_eq!(parse_if_match(&headers(value)).unwrap(), expected);
    }

    #[test]
    fn missing_if_match_is_none() {
        assert_eq!(parse_if_match(&HeaderMap::new()).unwrap(), None);
    }

    #[rstest]
    #[case("\"abc\"")]
    #[case("\"3")]
    #[case("v3")]
    fn garbage_if_match_is_bad_request(#[case] value: &str) {
        assert_matches!(
            parse_if_match(&headers(value)),
            Err(ServiceError::BadRequest(_))
        );
    }

    #[test]
    fn etag_is_quoted_version() {
        assert_eq!(etag(4), "\"4\"");
    }

    #[test]
    fn pagination_defaults_and_caps() {
        let config = AppConfig::new(
            "sqlite::memory:".into(),
            "k".repeat(64),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        assert_eq!(
            PaginationParams::default().resolve(&config).unwrap(),
            (1, config.api_default_page_size)
        );
        let huge = PaginationParams {
            page: Some(0),
            per_page: Some(10_000),
        };
        assert_eq!(huge.resolve(&config).unwrap(), (1, config.api_max_page_size));
    }

    #[test]
    fn unaddressable_page_is_rejected() {
        let config = AppConfig::new(
            "sqlite::memory:".into(),
            "k".repeat(64),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        let overflow = PaginationParams {
            page: Some(u64::MAX),
            per_page: Some(20),
        };
        assert_matches!(overflow.resolve(&config), Err(ServiceError::BadRequest(_)));

        let far = PaginationParams {
            page: Some(1_000_000),
            per_page: Some(20),
        };
        assert_eq!(far.resolve(&config).unwrap(), (1_000_000, 20));
    }
}
