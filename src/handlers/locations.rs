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
use crate::entities::{location, LocationType};
use crate::errors::ServiceError;
use crate::services::locations::{LocationChanges, LocationFilter, NewLocation};
use crate::{ApiResponse, AppState, PaginatedResponse};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LocationResponse {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub location_type: LocationType,
    pub parent_id: Option<Uuid>,
    pub description: Option<String>,
    pub is_active: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<location::Model> for LocationResponse {
    fn from(model: location::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            name: model.name,
            location_type: model.location_type,
            parent_id: model.parent_id,
            description: model.description,
            is_active: model.is_active,
            version: model.version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct LocationListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub location_type: Option<LocationType>,
    pub is_active: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/v1/locations",
    params(LocationListQuery),
    responses(
        (status = 200, description = "Page of locations", body = ApiResponse<PaginatedResponse<LocationResponse>>),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "locations"
)]
pub async fn list_locations(
    State(state): State<AppState>,
    Query(query): Query<LocationListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<LocationResponse>>>, ServiceError> {
    let (page, per_page) = PaginationParams {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve(&state.config)?;

    let filter = LocationFilter {
        location_type: query.location_type,
        is_active: query.is_active,
    };
    let rows = state.services.locations.list(filter, page, per_page).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::from_page(
        rows.map(LocationResponse::from),
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/locations/{id}",
    params(("id" = Uuid, Path, description = "Location ID")),
    responses(
        (status = 200, description = "Location", body = ApiResponse<LocationResponse>,
            headers(("ETag" = String, description = "Row version"))),
        (status = 404, description = "Unknown location", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "locations"
)]
pub async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let found = state.services.locations.get(id).await?;
    Ok(versioned(
        StatusCode::OK,
        found.version,
        LocationResponse::from(found),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/locations/{id}/children",
    params(("id" = Uuid, Path, description = "Parent location ID")),
    responses(
        (status = 200, description = "Direct children", body = ApiResponse<Vec<LocationResponse>>),
        (status = 404, description = "Unknown location", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "locations"
)]
pub async fn location_children(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<LocationResponse>>>, ServiceError> {
    let children = state.services.locations.children(id).await?;
    Ok(Json(ApiResponse::success(
        children.into_iter().map(LocationResponse::from).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/locations",
    request_body = NewLocation,
    responses(
        (status = 201, description = "Location created", body = ApiResponse<LocationResponse>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already in use", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "locations"
)]
pub async fn create_location(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewLocation>,
) -> Result<Response, ServiceError> {
    let created = state.services.locations.create(input).await?;
    Ok(versioned(
        StatusCode::CREATED,
        created.version,
        LocationResponse::from(created),
    ))
}

#[utoipa::path(
    put,
    path = "/api/v1/locations/{id}",
    params(
        ("id" = Uuid, Path, description = "Location ID"),
        ("If-Match" = Option<String>, Header, description = "Expected ETag"),
    ),
    request_body = LocationChanges,
    responses(
        (status = 200, description = "Location updated", body = ApiResponse<LocationResponse>),
        (status = 400, description = "Invalid input or hierarchy cycle", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stale ETag", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "locations"
)]
pub async fn update_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    ApiJson(changes): ApiJson<LocationChanges>,
) -> Result<Response, ServiceError> {
    let if_match = parse_if_match(&headers)?;
    let updated = state.services.locations.update(id, if_match, changes).await?;
    Ok(versioned(
        StatusCode::OK,
        updated.version,
        LocationResponse::from(updated),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/locations/{id}",
    params(
        ("id" = Uuid, Path, description = "Location ID"),
        ("If-Match" = Option<String>, Header, description = "Expected ETag"),
    ),
    responses(
        (status = 204, description = "Location deleted"),
        (status = 409, description = "Location still in use or stale ETag", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "locations"
)]
pub async fn delete_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    let if_match = parse_if_match(&headers)?;
    state.services.locations.delete(id, if_match).await?;
    Ok(no_content())
}
