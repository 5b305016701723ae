use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::{no_content, parse_if_match, versioned, ApiJson, PaginationParams};
use super::transactions::TransactionResponse;
use crate::auth::AuthUser;
use crate::entities::inventory_item;
use crate::errors::ServiceError;
use crate::services::items::{ItemChanges, ItemFilter, NewItem};
use crate::{ApiResponse, AppState, PaginatedResponse};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ItemResponse {
    pub id: Uuid,
    pub sku: String,
    pub barcode: String,
    pub name: String,
    pub description: Option<String>,
    pub quantity: i32,
    #[schema(value_type = String, example = "12.50")]
    pub unit_cost: Decimal,
    pub reorder_point: i32,
    pub low_stock: bool,
    pub location_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub is_active: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<inventory_item::Model> for ItemResponse {
    fn from(model: inventory_item::Model) -> Self {
        Self {
            low_stock: model.is_low_stock(),
            id: model.id,
            sku: model.sku,
            barcode: model.barcode,
            name: model.name,
            description: model.description,
            quantity: model.quantity,
            unit_cost: model.unit_cost,
            reorder_point: model.reorder_point,
            location_id: model.location_id,
            supplier_id: model.supplier_id,
            is_active: model.is_active,
            version: model.version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ItemListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub location_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub is_active: Option<bool>,
    /// Matches SKU or name
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScanRequest {
    /// Raw scanner output, framing characters included
    pub barcode: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdjustStockRequest {
    /// Signed change; the resulting quantity never drops below zero
    pub delta: i32,
    #[validate(length(max = 1024))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StockAdjustmentResponse {
    pub previous_quantity: i32,
    pub item: ItemResponse,
    pub transaction: TransactionResponse,
}

#[utoipa::path(
    get,
    path = "/api/v1/items",
    params(ItemListQuery),
    responses(
        (status = 200, description = "Page of items", body = ApiResponse<PaginatedResponse<ItemResponse>>),
    ),
    security(("bearer_auth" = [])),
    tag = "items"
)]
pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<ItemResponse>>>, ServiceError> {
    let (page, per_page) = PaginationParams {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve(&state.config)?;

    let filter = ItemFilter {
        location_id: query.location_id,
        supplier_id: query.supplier_id,
        is_active: query.is_active,
        search: query.search,
    };
    let rows = state.services.items.list(filter, page, per_page).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::from_page(
        rows.map(ItemResponse::from),
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/items/low-stock",
    params(PaginationParams),
    responses(
        (status = 200, description = "Items at or below their reorder point", body = ApiResponse<PaginatedResponse<ItemResponse>>),
    ),
    security(("bearer_auth" = [])),
    tag = "items"
)]
pub async fn low_stock_items(
    State(state): State<AppState>,
    Query(paging): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<ItemResponse>>>, ServiceError> {
    let (page, per_page) = paging.resolve(&state.config)?;
    let rows = state.services.items.low_stock(page, per_page).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::from_page(
        rows.map(ItemResponse::from),
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/items/{id}",
    params(("id" = Uuid, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item", body = ApiResponse<ItemResponse>,
            headers(("ETag" = String, description = "Row version"))),
        (status = 404, description = "Unknown item", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "items"
)]
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let found = state.services.items.get(id).await?;
    Ok(versioned(StatusCode::OK, found.version, ItemResponse::from(found)))
}

#[utoipa::path(
    get,
    path = "/api/v1/items/barcode/{code}",
    params(("code" = String, Path, description = "Barcode as printed")),
    responses(
        (status = 200, description = "Item carrying the barcode", body = ApiResponse<ItemResponse>),
        (status = 400, description = "Malformed barcode", body = crate::errors::ErrorResponse),
        (status = 404, description = "No item with this barcode", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "items"
)]
pub async fn get_item_by_barcode(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, ServiceError> {
    let found = state.services.items.get_by_barcode(&code).await?;
    Ok(versioned(StatusCode::OK, found.version, ItemResponse::from(found)))
}

/// Scanner entry point: accepts raw device output, including AIM prefixes and
/// trailing control characters.
#[utoipa::path(
    post,
    path = "/api/v1/items/scan",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Item carrying the barcode", body = ApiResponse<ItemResponse>),
        (status = 400, description = "Malformed barcode", body = crate::errors::ErrorResponse),
        (status = 404, description = "No item with this barcode", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "items"
)]
pub async fn scan_item(
    State(state): State<AppState>,
    ApiJson(scan): ApiJson<ScanRequest>,
) -> Result<Response, ServiceError> {
    let found = state.services.items.get_by_barcode(&scan.barcode).await?;
    Ok(versioned(StatusCode::OK, found.version, ItemResponse::from(found)))
}

#[utoipa::path(
    post,
    path = "/api/v1/items",
    request_body = NewItem,
    responses(
        (status = 201, description = "Item created", body = ApiResponse<ItemResponse>),
        (status = 400, description = "Invalid input or barcode", body = crate::errors::ErrorResponse),
        (status = 409, description = "SKU or barcode already in use", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "items"
)]
pub async fn create_item(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewItem>,
) -> Result<Response, ServiceError> {
    let created = state.services.items.create(input).await?;
    Ok(versioned(
        StatusCode::CREATED,
        created.version,
        ItemResponse::from(created),
    ))
}

#[utoipa::path(
    put,
    path = "/api/v1/items/{id}",
    params(
        ("id" = Uuid, Path, description = "Item ID"),
        ("If-Match" = Option<String>, Header, description = "Expected ETag"),
    ),
    request_body = ItemChanges,
    responses(
        (status = 200, description = "Item updated", body = ApiResponse<ItemResponse>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stale ETag or duplicate SKU/barcode", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "items"
)]
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    ApiJson(changes): ApiJson<ItemChanges>,
) -> Result<Response, ServiceError> {
    let if_match = parse_if_match(&headers)?;
    let updated = state.services.items.update(id, if_match, changes).await?;
    Ok(versioned(
        StatusCode::OK,
        updated.version,
        ItemResponse::from(updated),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/items/{id}",
    params(
        ("id" = Uuid, Path, description = "Item ID"),
        ("If-Match" = Option<String>, Header, description = "Expected ETag"),
    ),
    responses(
        (status = 204, description = "Item deleted"),
        (status = 409, description = "Open transactions or stale ETag", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "items"
)]
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    let if_match = parse_if_match(&headers)?;
    state.services.items.delete(id, if_match).await?;
    Ok(no_content())
}

#[utoipa::path(
    post,
    path = "/api/v1/items/{id}/adjust",
    params(
        ("id" = Uuid, Path, description = "Item ID"),
        ("If-Match" = Option<String>, Header, description = "Expected ETag"),
    ),
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Stock adjusted", body = ApiResponse<StockAdjustmentResponse>),
        (status = 400, description = "Zero delta", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stale ETag", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "items"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
    headers: HeaderMap,
    ApiJson(request): ApiJson<AdjustStockRequest>,
) -> Result<Response, ServiceError> {
    request.validate()?;
    let if_match = parse_if_match(&headers)?;
    let adjustment = state
        .services
        .items
        .adjust_stock(id, request.delta, if_match, request.reason, Some(user.user_id))
        .await?;

    let version = adjustment.item.version;
    Ok(versioned(
        StatusCode::OK,
        version,
        StockAdjustmentResponse {
            previous_quantity: adjustment.previous_quantity,
            item: adjustment.item.into(),
            transaction: adjustment.transaction.into(),
        },
    ))
}
