use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{double_option, ensure_version, expected_version, not_blank, Page};
use crate::barcode::Barcode;
use crate::db::DbPool;
use crate::entities::inventory_item::{self, apply_delta};
use crate::entities::{
    inventory_transaction, location, supplier, TransactionStatus, TransactionType,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{Repository, UnitOfWork};

fn non_negative_decimal(value: &Decimal) -> Result<(), validator::ValidationError> {
    if value.is_sign_negative() {
        return Err(validator::ValidationError::new("negative"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewItem {
    #[validate(length(min = 1, max = 64), custom = "not_blank")]
    pub sku: String,
    /// Raw scanner input; normalized and check-digit validated on create.
    pub barcode: String,
    #[validate(length(min = 1, max = 256), custom = "not_blank")]
    pub name: String,
    #[validate(length(max = 4096))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub quantity: i32,
    #[serde(default)]
    #[validate(custom = "non_negative_decimal")]
    #[schema(value_type = String, example = "12.50")]
    pub unit_cost: Decimal,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub reorder_point: i32,
    pub location_id: Uuid,
    pub supplier_id: Option<Uuid>,
}

/// Partial item update. Stock levels are not editable here.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ItemChanges {
    #[validate(length(min = 1, max = 64), custom = "not_blank")]
    pub sku: Option<String>,
    pub barcode: Option<String>,
    #[validate(length(min = 1, max = 256), custom = "not_blank")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[validate(custom = "non_negative_decimal")]
    #[schema(value_type = Option<String>)]
    pub unit_cost: Option<Decimal>,
    #[validate(range(min = 0))]
    pub reorder_point: Option<i32>,
    pub location_id: Option<Uuid>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub supplier_id: Option<Option<Uuid>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub location_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub is_active: Option<bool>,
    /// Substring of SKU or name.
    pub search: Option<String>,
}

/// Result of a manual stock correction.
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub item: inventory_item::Model,
    pub transaction: inventory_transaction::Model,
    pub previous_quantity: i32,
}

#[derive(Clone)]
pub struct ItemService {
    db: Arc<DbPool>,
    events: Arc<EventSender>,
}

impl ItemService {
    pub fn new(db: Arc<DbPool>, events: Arc<EventSender>) -> Self {
        Self { db, events }
    }

    fn repo(&self) -> Repository<'_, DbPool, inventory_item::Entity> {
        Repository::new(self.db.as_ref())
    }

    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create(&self, input: NewItem) -> Result<inventory_item::Model, ServiceError> {
        input.validate()?;
        let barcode = Barcode::parse(&input.barcode)?;

        self.require_location(input.location_id).await?;
        if let Some(supplier_id) = input.supplier_id {
            self.require_supplier(supplier_id).await?;
        }

        let created = self
            .repo()
            .insert(inventory_item::ActiveModel {
                sku: Set(input.sku.trim().to_string()),
                barcode: Set(barcode.into_string()),
                name: Set(input.name.trim().to_string()),
                description: Set(input.description),
                quantity: Set(input.quantity),
                unit_cost: Set(input.unit_cost),
                reorder_point: Set(input.reorder_point),
                location_id: Set(input.location_id),
                supplier_id: Set(input.supplier_id),
                is_active: Set(true),
                ..Default::default()
            })
            .await?;

        counter!("stockscan_items_created_total", 1);
        info!(item_id = %created.id, barcode = %created.barcode, "item created");
        self.events.publish(Event::ItemCreated {
            item_id: created.id,
            sku: created.sku.clone(),
            barcode: created.barcode.clone(),
        });
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<inventory_item::Model, ServiceError> {
        self.repo().get(id).await
    }

    /// Resolves raw scanner input to an item.
    #[instrument(skip(self))]
    pub async fn get_by_barcode(&self, raw: &str) -> Result<inventory_item::Model, ServiceError> {
        let barcode = Barcode::parse(raw)?;
        let found = inventory_item::Entity::find()
            .filter(inventory_item::Column::Barcode.eq(barcode.as_str()))
            .one(self.db.as_ref())
            .await?;

        counter!(
            "stockscan_scans_total",
            1,
            "result" => if found.is_some() { "hit" } else { "miss" }
        );
        found.ok_or_else(|| ServiceError::not_found("item with barcode", barcode))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: ItemFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<inventory_item::Model>, ServiceError> {
        let mut select = inventory_item::Entity::find().order_by_asc(inventory_item::Column::Sku);
        if let Some(location_id) = filter.location_id {
            select = select.filter(inventory_item::Column::LocationId.eq(location_id));
        }
        if let Some(supplier_id) = filter.supplier_id {
            select = select.filter(inventory_item::Column::SupplierId.eq(supplier_id));
        }
        if let Some(active) = filter.is_active {
            select = select.filter(inventory_item::Column::IsActive.eq(active));
        }
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            select = select.filter(
                Condition::any()
                    .add(inventory_item::Column::Sku.contains(term))
                    .add(inventory_item::Column::Name.contains(term)),
            );
        }

        let (rows, total) = self.repo().page(select, page, per_page).await?;
        Ok(Page::new(rows, total, page, per_page))
    }

    /// Active items at or below their reorder point, emptiest first.
    #[instrument(skip(self))]
    pub async fn low_stock(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<Page<inventory_item::Model>, ServiceError> {
        let select = inventory_item::Entity::find()
            .filter(inventory_item::Column::IsActive.eq(true))
            .filter(
                Expr::col(inventory_item::Column::Quantity)
                    .lte(Expr::col(inventory_item::Column::ReorderPoint)),
            )
            .order_by_asc(inventory_item::Column::Quantity)
            .order_by_asc(inventory_item::Column::Sku);

        let (rows, total) = self.repo().page(select, page, per_page).await?;
        Ok(Page::new(rows, total, page, per_page))
    }

    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: Uuid,
        if_match: Option<i32>,
        changes: ItemChanges,
    ) -> Result<inventory_item::Model, ServiceError> {
        changes.validate()?;
        let current = self.repo().get(id).await?;
        ensure_version(id, if_match, current.version)?;

        let mut active = inventory_item::ActiveModel::default();
        if let Some(sku) = changes.sku {
            active.sku = Set(sku.trim().to_string());
        }
        if let Some(raw) = changes.barcode {
            active.barcode = Set(Barcode::parse(&raw)?.into_string());
        }
        if let Some(name) = changes.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = changes.description {
            active.description = Set(description);
        }
        if let Some(unit_cost) = changes.unit_cost {
            active.unit_cost = Set(unit_cost);
        }
        if let Some(reorder_point) = changes.reorder_point {
            active.reorder_point = Set(reorder_point);
        }
        if let Some(location_id) = changes.location_id {
            self.require_location(location_id).await?;
            active.location_id = Set(location_id);
        }
        if let Some(supplier_id) = changes.supplier_id {
            if let Some(supplier_id) = supplier_id {
                self.require_supplier(supplier_id).await?;
            }
            active.supplier_id = Set(supplier_id);
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }

        self.repo()
            .update_versioned(id, expected_version(if_match, current.version), active)
            .await
    }

    /// Deletes an item together with its finished transaction history.
    ///
    /// Refused while any transaction for the item can still change stock.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid, if_match: Option<i32>) -> Result<(), ServiceError> {
        let uow = UnitOfWork::begin(&self.db).await?;
        let result = Self::delete_in(&uow, id, if_match).await;
        match result {
            Ok(()) => {
                uow.commit().await?;
                info!(item_id = %id, "item deleted");
                Ok(())
            }
            Err(e) => {
                uow.rollback().await?;
                Err(e)
            }
        }
    }

    async fn delete_in(uow: &UnitOfWork, id: Uuid, if_match: Option<i32>) -> Result<(), ServiceError> {
        let items = uow.repo::<inventory_item::Entity>();
        let current = items.get_for_update(id).await?;
        ensure_version(id, if_match, current.version)?;

        let open = inventory_transaction::Entity::find()
            .filter(inventory_transaction::Column::ItemId.eq(id))
            .filter(inventory_transaction::Column::Status.is_in(TransactionStatus::open_states()))
            .count(uow.connection())
            .await?;
        if open > 0 {
            return Err(ServiceError::Conflict(format!(
                "item {} has {} open transaction(s)",
                current.sku, open
            )));
        }

        inventory_transaction::Entity::delete_many()
            .filter(inventory_transaction::Column::ItemId.eq(id))
            .exec(uow.connection())
            .await?;
        items
            .delete(id, expected_version(if_match, current.version))
            .await
    }

    /// Applies a signed correction immediately and records it as a completed
    /// adjustment transaction. The resulting quantity is clamped at zero.
    #[instrument(skip(self, reason))]
    pub async fn adjust_stock(
        &self,
        id: Uuid,
        delta: i32,
        if_match: Option<i32>,
        reason: Option<String>,
        actor: Option<String>,
    ) -> Result<StockAdjustment, ServiceError> {
        if delta == 0 {
            return Err(ServiceError::ValidationError(
                "delta: adjustment must be non-zero".to_string(),
            ));
        }

        let uow = UnitOfWork::begin(&self.db).await?;
        let result = Self::adjust_in(&uow, id, delta, if_match, reason, actor).await;
        let adjustment = match result {
            Ok(adjustment) => {
                uow.commit().await?;
                adjustment
            }
            Err(e) => {
                uow.rollback().await?;
                return Err(e);
            }
        };

        counter!("stockscan_stock_adjustments_total", 1);
        info!(
            item_id = %id,
            from = adjustment.previous_quantity,
            to = adjustment.item.quantity,
            "stock adjusted"
        );
        publish_stock_change(
            &self.events,
            adjustment.previous_quantity,
            &adjustment.item,
            Some(adjustment.transaction.id),
        );
        Ok(adjustment)
    }

    async fn adjust_in(
        uow: &UnitOfWork,
        id: Uuid,
        delta: i32,
        if_match: Option<i32>,
        reason: Option<String>,
        actor: Option<String>,
    ) -> Result<StockAdjustment, ServiceError> {
        let items = uow.repo::<inventory_item::Entity>();
        let current = items.get_for_update(id).await?;
        ensure_version(id, if_match, current.version)?;

        let item = items
            .update_versioned(
                id,
                current.version,
                inventory_item::ActiveModel {
                    quantity: Set(apply_delta(current.quantity, delta)),
                    ..Default::default()
                },
            )
            .await?;

        let transaction = uow
            .repo::<inventory_transaction::Entity>()
            .insert(inventory_transaction::ActiveModel {
                item_id: Set(id),
                transaction_type: Set(TransactionType::Adjustment),
                status: Set(TransactionStatus::Completed),
                quantity: Set(delta),
                source_location_id: Set(Some(current.location_id)),
                destination_location_id: Set(None),
                notes: Set(reason),
                failure_reason: Set(None),
                created_by: Set(actor.clone()),
                approved_by: Set(actor),
                processed_at: Set(Some(Utc::now())),
                ..Default::default()
            })
            .await?;

        Ok(StockAdjustment {
            previous_quantity: current.quantity,
            item,
            transaction,
        })
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

    async fn require_supplier(&self, id: Uuid) -> Result<(), ServiceError> {
        let exists = Repository::<_, supplier::Entity>::new(self.db.as_ref())
            .exists(id)
            .await?;
        if !exists {
            return Err(ServiceError::BadRequest(format!(
                "supplier {} does not exist",
                id
            )));
        }
        Ok(())
    }
}

/// Emits `StockAdjusted`, plus `LowStock` when the item ended at or below its reorder point.
pub(crate) fn publish_stock_change(
    events: &EventSender,
    previous: i32,
    item: &inventory_item::Model,
    transaction_id: Option<Uuid>,
) {
    events.publish(Event::StockAdjusted {
        item_id: item.id,
        old_quantity: previous,
        new_quantity: item.quantity,
        transaction_id,
    });

    if item.is_low_stock() && item.quantity < previous {
        warn!(item_id = %item.id, quantity = item.quantity, "item below reorder point");
        events.publish(Event::LowStock {
            item_id: item.id,
            quantity: item.quantity,
            reorder_point: item.reorder_point,
        });
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{new_item, EAN};
    use super::*;
    use crate::services::test_support::Fixture;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn create_normalizes_scanner_input() {
        let fx = Fixture::new().await;
        let loc = fx.location("WH").await;

        let created = fx
            .services
            .items
            .create(new_item("SKU-1", &format!("]E0{EAN}\r\n"), loc.id))
            .await
            .unwrap();
        assert_eq!(created.barcode, EAN);
        assert_eq!(created.unit_cost, dec!(12.50));

        let scanned = fx
            .services
            .items
            .get_by_barcode(&format!("  {EAN}\t"))
            .await
            .unwrap();
        assert_eq!(scanned.id, created.id);
    }

    #[tokio::test]
    async fn bad_check_digit_is_rejected() {
        let fx = Fixture::new().await;
        let loc = fx.location("WH").await;
        assert_matches!(
            fx.services
                .items
                .create(new_item("SKU-1", "4006381333932", loc.id))
                .await,
            Err(ServiceError::InvalidBarcode(_))
        );
    }

    #[tokio::test]
    async fn missing_location_and_duplicate_barcode() {
        let fx = Fixture::new().await;
        assert_matches!(
            fx.services
                .items
                .create(new_item("SKU-1", EAN, Uuid::new_v4()))
                .await,
            Err(ServiceError::BadRequest(_))
        );

        let loc = fx.location("WH").await;
        fx.services
            .items
            .create(new_item("SKU-1", EAN, loc.id))
            .await
            .unwrap();
        assert_matches!(
            fx.services
                .items
                .create(new_item("SKU-2", EAN, loc.id))
                .await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn unknown_barcode_is_not_found() {
        let fx = Fixture::new().await;
        assert_matches!(
            fx.services.items.get_by_barcode("PART-XYZ").await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn adjust_stock_clamps_and_records_a_transaction() {
        let mut fx = Fixture::new().await;
        let loc = fx.location("WH").await;
        let item = fx
            .services
            .items
            .create(new_item("SKU-1", EAN, loc.id))
            .await
            .unwrap();
        fx.drain_events();

        let adjustment = fx
            .services
            .items
            .adjust_stock(item.id, -25, Some(1), Some("cycle count".into()), Some("u1".into()))
            .await
            .unwrap();
        assert_eq!(adjustment.previous_quantity, 10);
        assert_eq!(adjustment.item.quantity, 0);
        assert_eq!(adjustment.item.version, 2);
        assert_eq!(adjustment.transaction.status, TransactionStatus::Completed);
        assert_eq!(adjustment.transaction.quantity, -25);

        let events = fx.drain_events();
        assert!(events.iter().any(|e| matches!(e, Event::StockAdjusted { new_quantity: 0, .. })));
        assert!(events.iter().any(|e| matches!(e, Event::LowStock { .. })));
    }

    #[tokio::test]
    async fn adjust_stock_rejects_zero_and_stale_versions() {
        let fx = Fixture::new().await;
        let loc = fx.location("WH").await;
        let item = fx
            .services
            .items
            .create(new_item("SKU-1", EAN, loc.id))
            .await
            .unwrap();

        assert_matches!(
            fx.services.items.adjust_stock(item.id, 0, None, None, None).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            fx.services.items.adjust_stock(item.id, 5, Some(9), None, None).await,
            Err(ServiceError::ConcurrentModification(_))
        );
        assert_eq!(fx.services.items.get(item.id).await.unwrap().quantity, 10);
    }

    #[tokio::test]
    async fn low_stock_lists_items_at_or_below_reorder_point() {
        let fx = Fixture::new().await;
        let loc = fx.location("WH").await;
        let svc = &fx.services.items;
        let low = svc
            .create(NewItem {
                quantity: 3,
                ..new_item("LOW", EAN, loc.id)
            })
            .await
            .unwrap();
        svc.create(new_item("OK", "036000291452", loc.id))
            .await
            .unwrap();

        let page = svc.low_stock(1, 20).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, low.id);
    }

    #[tokio::test]
    async fn update_changes_attributes_but_not_quantity() {
        let fx = Fixture::new().await;
        let loc = fx.location("WH").await;
        let other = fx.location("WH-2").await;
        let svc = &fx.services.items;
        let item = svc.create(new_item("SKU-1", EAN, loc.id)).await.unwrap();

        let updated = svc
            .update(
                item.id,
                Some(1),
                ItemChanges {
                    name: Some("Renamed".into()),
                    location_id: Some(other.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.location_id, other.id);
        assert_eq!(updated.quantity, 10);
    }

    #[tokio::test]
    async fn delete_removes_item_with_finished_history() {
        let fx = Fixture::new().await;
        let loc = fx.location("WH").await;
        let svc = &fx.services.items;
        let item = svc.create(new_item("SKU-1", EAN, loc.id)).await.unwrap();
        svc.adjust_stock(item.id, 2, None, None, None).await.unwrap();

        svc.delete(item.id, Some(2)).await.unwrap();
        assert_matches!(svc.get(item.id).await, Err(ServiceError::NotFound(_)));
    }
}
