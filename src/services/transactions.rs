//! Stock movements and their approval lifecycle.
//!
//! ```text
//! Pending ──approve──▶ Approved ──process──▶ Processing ──▶ Completed
//!    │                    │                       └───────▶ Failed
//!    └──────cancel────────┴──▶ Cancelled
//! ```
//!
//! Every status change is a conditional `UPDATE ... WHERE status = <from>`,
//! so two callers racing on the same transaction cannot both win.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::items::publish_stock_change;
use super::{ensure_version, Page};
use crate::db::DbPool;
use crate::entities::inventory_item::{self, apply_delta};
use crate::entities::inventory_transaction::{self, Model as Transaction};
use crate::entities::{location, TransactionStatus, TransactionType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{Repository, UnitOfWork};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewTransaction {
    pub item_id: Uuid,
    pub transaction_type: TransactionType,
    /// Positive for receipts, issues and transfers; signed for adjustments.
    pub quantity: i32,
    /// Defaults to the item's current location for transfers.
    pub source_location_id: Option<Uuid>,
    pub destination_location_id: Option<Uuid>,
    #[validate(length(max = 1024))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
    pub transaction_type: Option<TransactionType>,
    pub item_id: Option<Uuid>,
}

/// Before/after snapshot of the item touched by a processed transaction.
struct StockEffect {
    before: inventory_item::Model,
    after: inventory_item::Model,
}

#[derive(Clone)]
pub struct TransactionService {
    db: Arc<DbPool>,
    events: Arc<EventSender>,
}

impl TransactionService {
    pub fn new(db: Arc<DbPool>, events: Arc<EventSender>) -> Self {
        Self { db, events }
    }

    fn repo(&self) -> Repository<'_, DbPool, inventory_transaction::Entity> {
        Repository::new(self.db.as_ref())
    }

    /// Records a movement in `Pending`; stock is untouched until processing.
    #[instrument(skip(self, input), fields(item_id = %input.item_id, kind = %input.transaction_type))]
    pub async fn create(
        &self,
        input: NewTransaction,
        created_by: Option<String>,
    ) -> Result<Transaction, ServiceError> {
        input.validate()?;
        if !input.transaction_type.accepts_quantity(input.quantity) {
            let rule = match input.transaction_type {
                TransactionType::Adjustment => "must be non-zero",
                _ => "must be positive",
            };
            return Err(ServiceError::ValidationError(format!(
                "quantity: {} quantity {}",
                input.transaction_type, rule
            )));
        }

        let item = Repository::<_, inventory_item::Entity>::new(self.db.as_ref())
            .find(input.item_id)
            .await?
            .ok_or_else(|| {
                ServiceError::BadRequest(format!("item {} does not exist", input.item_id))
            })?;
        if !item.is_active {
            return Err(ServiceError::BadRequest(format!(
                "item {} is inactive",
                item.sku
            )));
        }

        let (source, destination) = match input.transaction_type {
            TransactionType::Transfer => {
                let source = input.source_location_id.unwrap_or(item.location_id);
                let destination = input.destination_location_id.ok_or_else(|| {
                    ServiceError::ValidationError(
                        "destination_location_id: required for transfers".to_string(),
                    )
                })?;
                if source == destination {
                    return Err(ServiceError::ValidationError(
                        "destination_location_id: must differ from the source".to_string(),
                    ));
                }
                (Some(source), Some(destination))
            }
            _ => (input.source_location_id, input.destination_location_id),
        };

        for location_id in source.iter().chain(destination.iter()) {
            self.require_location(*location_id).await?;
        }

        let created = self
            .repo()
            .insert(inventory_transaction::ActiveModel {
                item_id: Set(item.id),
                transaction_type: Set(input.transaction_type),
                status: Set(TransactionStatus::Pending),
                quantity: Set(input.quantity),
                source_location_id: Set(source),
                destination_location_id: Set(destination),
                notes: Set(input.notes),
                failure_reason: Set(None),
                created_by: Set(created_by),
                approved_by: Set(None),
                processed_at: Set(None),
                ..Default::default()
            })
            .await?;

        counter!(
            "stockscan_transactions_created_total",
            1,
            "type" => created.transaction_type.to_string()
        );
        info!(transaction_id = %created.id, reference = %created.reference, "transaction created");
        self.events.publish(Event::TransactionCreated {
            transaction_id: created.id,
            item_id: created.item_id,
            transaction_type: created.transaction_type,
            quantity: created.quantity,
        });
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Transaction, ServiceError> {
        self.repo().get(id).await
    }

    /// Newest first.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: TransactionFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<Transaction>, ServiceError> {
        let mut select = inventory_transaction::Entity::find()
            .order_by_desc(inventory_transaction::Column::CreatedAt)
            .order_by_desc(inventory_transaction::Column::Reference);
        if let Some(status) = filter.status {
            select = select.filter(inventory_transaction::Column::Status.eq(status));
        }
        if let Some(kind) = filter.transaction_type {
            select = select.filter(inventory_transaction::Column::TransactionType.eq(kind));
        }
        if let Some(item_id) = filter.item_id {
            select = select.filter(inventory_transaction::Column::ItemId.eq(item_id));
        }

        let (rows, total) = self.repo().page(select, page, per_page).await?;
        Ok(Page::new(rows, total, page, per_page))
    }

    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        id: Uuid,
        if_match: Option<i32>,
        approver: Option<String>,
    ) -> Result<Transaction, ServiceError> {
        let current = self.repo().get(id).await?;
        ensure_version(id, if_match, current.version)?;

        let approved = transition(
            self.db.as_ref(),
            &current,
            TransactionStatus::Approved,
            inventory_transaction::ActiveModel {
                approved_by: Set(approver),
                ..Default::default()
            },
        )
        .await?;

        info!(transaction_id = %id, "transaction approved");
        self.events.publish(Event::TransactionApproved(id));
        Ok(approved)
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, id: Uuid, if_match: Option<i32>) -> Result<Transaction, ServiceError> {
        let current = self.repo().get(id).await?;
        ensure_version(id, if_match, current.version)?;

        let cancelled = transition(
            self.db.as_ref(),
            &current,
            TransactionStatus::Cancelled,
            Default::default(),
        )
        .await?;

        counter!("stockscan_transactions_finished_total", 1, "outcome" => "cancelled");
        info!(transaction_id = %id, "transaction cancelled");
        self.events.publish(Event::TransactionCancelled(id));
        Ok(cancelled)
    }

    /// Applies an approved transaction to stock.
    ///
    /// The claim (`Approved -> Processing`) is committed on its own so a
    /// concurrent caller sees the transaction as taken. The stock effect and
    /// the move to `Completed` then share one unit of work. A movement that
    /// can no longer be applied ends `Failed` with a reason and is returned
    /// as `Ok`. Infrastructure errors after the claim also end `Failed`, then
    /// surface as `Err`.
    #[instrument(skip(self))]
    pub async fn process(&self, id: Uuid, if_match: Option<i32>) -> Result<Transaction, ServiceError> {
        let current = self.repo().get(id).await?;
        ensure_version(id, if_match, current.version)?;

        let claimed = transition(
            self.db.as_ref(),
            &current,
            TransactionStatus::Processing,
            Default::default(),
        )
        .await?;

        let (completed, effect) = match self.complete(&claimed).await {
            Ok(Ok(done)) => done,
            Ok(Err(reason)) => return self.mark_failed(&claimed, &reason).await,
            Err(e) => {
                error!(transaction_id = %id, error = %e, "processing aborted");
                self.mark_failed(&claimed, "internal error while applying stock change")
                    .await?;
                return Err(e);
            }
        };

        counter!("stockscan_transactions_finished_total", 1, "outcome" => "completed");
        info!(
            transaction_id = %id,
            quantity = effect.after.quantity,
            "transaction completed"
        );
        self.events.publish(Event::TransactionCompleted(id));
        if effect.before.quantity != effect.after.quantity {
            publish_stock_change(&self.events, effect.before.quantity, &effect.after, Some(id));
        }
        Ok(completed)
    }

    /// Applies the effect of a claimed transaction and moves it to `Completed`
    /// in one unit of work. Nothing is written unless both succeed.
    async fn complete(
        &self,
        claimed: &Transaction,
    ) -> Result<Result<(Transaction, StockEffect), String>, ServiceError> {
        let uow = UnitOfWork::begin(&self.db).await?;
        let effect = match apply_effect(&uow, claimed).await {
            Ok(Ok(effect)) => effect,
            Ok(Err(reason)) => {
                discard(uow, claimed.id).await;
                return Ok(Err(reason));
            }
            Err(e) => {
                discard(uow, claimed.id).await;
                return Err(e);
            }
        };

        let completed = transition(
            uow.connection(),
            claimed,
            TransactionStatus::Completed,
            inventory_transaction::ActiveModel {
                processed_at: Set(Some(Utc::now())),
                ..Default::default()
            },
        )
        .await;
        match completed {
            Ok(completed) => {
                uow.commit().await?;
                Ok(Ok((completed, effect)))
            }
            Err(e) => {
                discard(uow, claimed.id).await;
                Err(e)
            }
        }
    }

    async fn mark_failed(
        &self,
        claimed: &Transaction,
        reason: &str,
    ) -> Result<Transaction, ServiceError> {
        warn!(transaction_id = %claimed.id, %reason, "transaction failed");
        let failed = transition(
            self.db.as_ref(),
            claimed,
            TransactionStatus::Failed,
            inventory_transaction::ActiveModel {
                failure_reason: Set(Some(reason.to_string())),
                processed_at: Set(Some(Utc::now())),
                ..Default::default()
            },
        )
        .await?;

        counter!("stockscan_transactions_finished_total", 1, "outcome" => "failed");
        self.events.publish(Event::TransactionFailed {
            transaction_id: claimed.id,
            reason: reason.to_string(),
        });
        Ok(failed)
    }

    async fn require_location(&self, id: Uuid) -> Result<(), ServiceError> {
        let exists = Repository::<_, location::Entity>::new(self.db.as_ref())
            .exists(id)
            .await?;
        if !exists {
            return Err(ServiceError::BadRequest(format!(
                "location {} does not exist",
                id
            )));
        }
        Ok(())
    }
}

async fn discard(uow: UnitOfWork, transaction_id: Uuid) {
    if let Err(e) = uow.rollback().await {
        warn!(%transaction_id, error = %e, "rollback failed");
    }
}

/// Moves `current` to `next` if it is still in the status it was read with.
async fn transition<C: ConnectionTrait>(
    conn: &C,
    current: &Transaction,
    next: TransactionStatus,
    mut changes: inventory_transaction::ActiveModel,
) -> Result<Transaction, ServiceError> {
    if !current.status.can_transition_to(next) {
        return Err(ServiceError::InvalidTransition(format!(
            "transaction {} cannot move from {} to {}",
            current.reference, current.status, next
        )));
    }

    changes.status = Set(next);
    changes.updated_at = Set(Utc::now());

    let result = inventory_transaction::Entity::update_many()
        .set(changes)
        .col_expr(
            inventory_transaction::Column::Version,
            Expr::col(inventory_transaction::Column::Version).add(1),
        )
        .filter(inventory_transaction::Column::Id.eq(current.id))
        .filter(inventory_transaction::Column::Status.eq(current.status))
        .exec(conn)
        .await?;

    let repo = Repository::<_, inventory_transaction::Entity>::new(conn);
    if result.rows_affected == 0 {
        let latest = repo.get(current.id).await?;
        return Err(ServiceError::InvalidTransition(format!(
            "transaction {} is already {}",
            latest.reference, latest.status
        )));
    }
    repo.get(current.id).await
}

/// Applies the stock effect of a claimed transaction inside `uow`.
///
/// `Ok(Err(reason))` means the movement is not applicable any more.
async fn apply_effect(
    uow: &UnitOfWork,
    tx: &Transaction,
) -> Result<Result<StockEffect, String>, ServiceError> {
    let items = uow.repo::<inventory_item::Entity>();
    let before = match items.get_for_update(tx.item_id).await {
        Ok(item) => item,
        Err(ServiceError::NotFound(_)) => {
            return Ok(Err(format!("item {} no longer exists", tx.item_id)))
        }
        Err(e) => return Err(e),
    };
    if !before.is_active {
        return Ok(Err(format!("item {} is inactive", before.sku)));
    }

    let mut changes = inventory_item::ActiveModel::default();
    match tx.transaction_type {
        TransactionType::Receipt | TransactionType::Adjustment => {
            changes.quantity = Set(apply_delta(before.quantity, tx.quantity));
        }
        TransactionType::Issue => {
            changes.quantity = Set(apply_delta(before.quantity, tx.quantity.saturating_neg()));
        }
        TransactionType::Transfer => {
            let Some(destination) = tx.destination_location_id else {
                return Ok(Err("transfer has no destination".to_string()));
            };
            if let Some(source) = tx.source_location_id {
                if source != before.location_id {
                    return Ok(Err(format!(
                        "item {} is not at the transfer source location",
                        before.sku
                    )));
                }
            }
            let destination_exists = uow.repo::<location::Entity>().exists(destination).await?;
            if !destination_exists {
                return Ok(Err(format!(
                    "destination location {} no longer exists",
                    destination
                )));
            }
            changes.location_id = Set(destination);
        }
    }

    let after = items
        .update_versioned(before.id, before.version, changes)
        .await?;
    Ok(Ok(StockEffect { before, after }))
}
