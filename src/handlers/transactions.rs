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

use super::common::{parse_if_match, versioned, ApiJson, PaginationParams};
use crate::auth::AuthUser;
use crate::entities::{inventory_transaction, TransactionStatus, TransactionType};
use crate::errors::ServiceError;
use crate::services::transactions::{NewTransaction, TransactionFilter};
use crate::{ApiResponse, AppState, PaginatedResponse};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub reference: String,
    pub item_id: Uuid,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub quantity: i32,
    pub source_location_id: Option<Uuid>,
    pub destination_location_id: Option<Uuid>,
    pub notes: Option<String>,
    pub failure_reason: Option<String>,
    pub created_by: Option<String>,
    pub approved_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<inventory_transaction::Model> for TransactionResponse {
    fn from(model: inventory_transaction::Model) -> Self {
        Self {
            id: model.id,
            reference: model.reference,
            item_id: model.item_id,
            transaction_type: model.transaction_type,
            status: model.status,
            quantity: model.quantity,
            source_location_id: model.source_location_id,
            destination_location_id: model.destination_location_id,
            notes: model.notes,
            failure_reason: model.failure_reason,
            created_by: model.created_by,
            approved_by: model.approved_by,
            processed_at: model.processed_at,
            version: model.version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TransactionListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<TransactionStatus>,
    pub transaction_type: Option<TransactionType>,
    pub item_id: Option<Uuid>,
}

fn respond(status: StatusCode, model: inventory_transaction::Model) -> Response {
    versioned(status, model.version, TransactionResponse::from(model))
}

#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    params(TransactionListQuery),
    responses(
        (status = 200, description = "Page of transactions, newest first", body = ApiResponse<PaginatedResponse<TransactionResponse>>),
    ),
    security(("bearer_auth" = [])),
    tag = "transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<TransactionResponse>>>, ServiceError> {
    let (page, per_page) = PaginationParams {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve(&state.config)?;

    let filter = TransactionFilter {
        status: query.status,
        transaction_type: query.transaction_type,
        item_id: query.item_id,
    };
    let rows = state
        .services
        .transactions
        .list(filter, page, per_page)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::from_page(
        rows.map(TransactionResponse::from),
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Transaction", body = ApiResponse<TransactionResponse>,
            headers(("ETag" = String, description = "Row version"))),
        (status = 404, description = "Unknown transaction", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let found = state.services.transactions.get(id).await?;
    Ok(respond(StatusCode::OK, found))
}

#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = NewTransaction,
    responses(
        (status = 201, description = "Transaction recorded as Pending", body = ApiResponse<TransactionResponse>),
        (status = 400, description = "Invalid quantity, unknown item or locations", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "transactions"
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(input): ApiJson<NewTransaction>,
) -> Result<Response, ServiceError> {
    let created = state
        .services
        .transactions
        .create(input, Some(user.user_id))
        .await?;
    Ok(respond(StatusCode::CREATED, created))
}

#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/approve",
    params(
        ("id" = Uuid, Path, description = "Transaction ID"),
        ("If-Match" = Option<String>, Header, description = "Expected ETag"),
    ),
    responses(
        (status = 200, description = "Transaction approved", body = ApiResponse<TransactionResponse>),
        (status = 409, description = "Not pending or stale ETag", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "transactions"
)]
pub async fn approve_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    let if_match = parse_if_match(&headers)?;
    let approved = state
        .services
        .transactions
        .approve(id, if_match, Some(user.user_id))
        .await?;
    Ok(respond(StatusCode::OK, approved))
}

/// Applies an approved transaction. A movement that can no longer be applied
/// still answers 200 with status `Failed` and a `failure_reason`.
#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/process",
    params(
        ("id" = Uuid, Path, description = "Transaction ID"),
        ("If-Match" = Option<String>, Header, description = "Expected ETag"),
    ),
    responses(
        (status = 200, description = "Transaction Completed or Failed", body = ApiResponse<TransactionResponse>),
        (status = 409, description = "Not approved, already claimed, or stale ETag", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "transactions"
)]
pub async fn process_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    let if_match = parse_if_match(&headers)?;
    let processed = state.services.transactions.process(id, if_match).await?;
    Ok(respond(StatusCode::OK, processed))
}

#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Transaction ID"),
        ("If-Match" = Option<String>, Header, description = "Expected ETag"),
    ),
    responses(
        (status = 200, description = "Transaction cancelled", body = ApiResponse<TransactionResponse>),
        (status = 409, description = "Already processing or finished", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "transactions"
)]
pub async fn cancel_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    let if_match = parse_if_match(&headers)?;
    let cancelled = state.services.transactions.cancel(id, if_match).await?;
    Ok(respond(StatusCode::OK, cancelled))
}
