use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::{no_content, parse_if_match, versioned, ApiJson, PaginationParams};
use crate::entities::supplier;
use crate::errors::ServiceError;
use crate::services::suppliers::{NewSupplier, SupplierChanges, SupplierFilter};
use crate::{ApiResponse, AppState, PaginatedResponse};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SupplierResponse {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<supplier::Model> for SupplierResponse {
    fn from(model: supplier::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            name: model.name,
            contact_name: model.contact_name,
            email: model.email,
            phone: model.phone,
            address: model.address,
            is_active: model.is_active,
            version: model.version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SupplierListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub is_active: Option<bool>,
    /// Matches code or name
    pub search: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/suppliers",
    params(SupplierListQuery),
    responses(
        (status = 200, description = "Page of suppliers", body = ApiResponse<PaginatedResponse<SupplierResponse>>),
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn list_suppliers(
    State(state): State<AppState>,
    Query(query): Query<SupplierListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<SupplierResponse>>>, ServiceError> {
    let (page, per_page) = PaginationParams {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve(&state.config)?;

    let filter = SupplierFilter {
        is_active: query.is_active,
        search: query.search,
    };
    let rows = state.services.suppliers.list(filter, page, per_page).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::from_page(
        rows.map(SupplierResponse::from),
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/suppliers/{id}",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Supplier", body = ApiResponse<SupplierResponse>,
            headers(("ETag" = String, description = "Row version"))),
        (status = 404, description = "Unknown supplier", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn get_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let found = state.services.suppliers.get(id).await?;
    Ok(versioned(
        StatusCode::OK,
        found.version,
        SupplierResponse::from(found),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/suppliers",
    request_body = NewSupplier,
    responses(
        (status = 201, description = "Supplier created", body = ApiResponse<SupplierResponse>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already in use", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn create_supplier(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewSupplier>,
) -> Result<Response, ServiceError> {
    let created = state.services.suppliers.create(input).await?;
    Ok(versioned(
        StatusCode::CREATED,
        created.version,
        SupplierResponse::from(created),
    ))
}

#[utoipa::path(
    put,
    path = "/api/v1/suppliers/{id}",
    params(
        ("id" = Uuid, Path, description = "Supplier ID"),
        ("If-Match" = Option<String>, Header, description = "Expected ETag"),
    ),
    request_body = SupplierChanges,
    responses(
        (status = 200, description = "Supplier updated", body = ApiResponse<SupplierResponse>),
        (status = 409, description = "Stale ETag", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn update_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    ApiJson(changes): ApiJson<SupplierChanges>,
) -> Result<Response, ServiceError> {
    let if_match = parse_if_match(&headers)?;
    let updated = state.services.suppliers.update(id, if_match, changes).await?;
    Ok(versioned(
        StatusCode::OK,
        updated.version,
        SupplierResponse::from(updated),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/suppliers/{id}",
    params(
        ("id" = Uuid, Path, description = "Supplier ID"),
        ("If-Match" = Option<String>, Header, description = "Expected ETag"),
    ),
    responses(
        (status = 204, description = "Supplier deleted"),
        (status = 409, description = "Supplier still referenced or stale ETag", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn delete_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    let if_match = parse_if_match(&headers)?;
    state.services.suppliers.delete(id, if_match).await?;
    Ok(no_content())
}
