use std::sync::Arc;

use metrics::counter;
use sea_orm::{ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{double_option, ensure_version, expected_version, not_blank, Page};
use crate::db::DbPool;
use crate::entities::{inventory_item, supplier};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::Repository;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewSupplier {
    #[validate(length(min = 1, max = 32), custom = "not_blank")]
    pub code: String,
    #[validate(length(min = 1, max = 128), custom = "not_blank")]
    pub name: String,
    #[validate(length(max = 128))]
    pub contact_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(length(max = 512))]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct SupplierChanges {
    #[validate(length(min = 1, max = 128), custom = "not_blank")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub contact_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub address: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct SupplierFilter {
    pub is_active: Option<bool>,
    /// Case-sensitive substring of code or name.
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct SupplierService {
    db: Arc<DbPool>,
    events: Arc<EventSender>,
}

impl SupplierService {
    pub fn new(db: Arc<DbPool>, events: Arc<EventSender>) -> Self {
        Self { db, events }
    }

    fn repo(&self) -> Repository<'_, DbPool, supplier::Entity> {
        Repository::new(self.db.as_ref())
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, input: NewSupplier) -> Result<supplier::Model, ServiceError> {
        input.validate()?;

        let created = self
            .repo()
            .insert(supplier::ActiveModel {
                code: Set(input.code.trim().to_string()),
                name: Set(input.name.trim().to_string()),
                contact_name: Set(input.contact_name),
                email: Set(input.email),
                phone: Set(input.phone),
                address: Set(input.address),
                is_active: Set(true),
                ..Default::default()
            })
            .await?;

        counter!("stockscan_suppliers_created_total", 1);
        info!(supplier_id = %created.id, "supplier created");
        self.events.publish(Event::SupplierCreated(created.id));
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<supplier::Model, ServiceError> {
        self.repo().get(id).await
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: SupplierFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<supplier::Model>, ServiceError> {
        let mut select = supplier::Entity::find().order_by_asc(supplier::Column::Code);
        if let Some(active) = filter.is_active {
            select = select.filter(supplier::Column::IsActive.eq(active));
        }
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            select = select.filter(
                Condition::any()
                    .add(supplier::Column::Code.contains(term))
                    .add(supplier::Column::Name.contains(term)),
            );
        }

        let (rows, total) = self.repo().page(select, page, per_page).await?;
        Ok(Page::new(rows, total, page, per_page))
    }

    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: Uuid,
        if_match: Option<i32>,
        changes: SupplierChanges,
    ) -> Result<supplier::Model, ServiceError> {
        changes.validate()?;
        if let Some(Some(email)) = &changes.email {
            if !validator::validate_email(email.as_str()) {
                return Err(ServiceError::ValidationError(format!(
                    "email: '{}' is not a valid address",
                    email
                )));
            }
        }

        let current = self.repo().get(id).await?;
        ensure_version(id, if_match, current.version)?;

        let mut active = supplier::ActiveModel::default();
        if let Some(name) = changes.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(contact_name) = changes.contact_name {
            active.contact_name = Set(contact_name);
        }
        if let Some(email) = changes.email {
            active.email = Set(email);
        }
        if let Some(phone) = changes.phone {
            active.phone = Set(phone);
        }
        if let Some(address) = changes.address {
            active.address = Set(address);
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }

        self.repo()
            .update_versioned(id, expected_version(if_match, current.version), active)
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid, if_match: Option<i32>) -> Result<(), ServiceError> {
        let current = self.repo().get(id).await?;
        ensure_version(id, if_match, current.version)?;

        let items = inventory_item::Entity::find()
            .filter(inventory_item::Column::SupplierId.eq(id))
            .count(self.db.as_ref())
            .await?;
        if items > 0 {
            return Err(ServiceError::Conflict(format!(
                "supplier {} is still referenced by {} item(s)",
                current.code, items
            )));
        }

        self.repo()
            .delete(id, expected_version(if_match, current.version))
            .await?;
        info!(supplier_id = %id, "supplier deleted");
        Ok(())
    }
}
