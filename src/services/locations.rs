use std::collections::HashSet;
use std::sync::Arc;

use metrics::counter;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{double_option, ensure_version, expected_version, not_blank, Page};
use crate::db::DbPool;
use crate::entities::{inventory_item, location, LocationType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{Repository, UnitOfWork};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewLocation {
    #[validate(length(min = 1, max = 32), custom = "not_blank")]
    pub code: String,
    #[validate(length(min = 1, max = 128), custom = "not_blank")]
    pub name: String,
    pub location_type: LocationType,
    pub parent_id: Option<Uuid>,
    #[validate(length(max = 1024))]
    pub description: Option<String>,
}

/// Partial update. `parent_id: null` detaches the location from its parent.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct LocationChanges {
    #[validate(length(min = 1, max = 128), custom = "not_blank")]
    pub name: Option<String>,
    pub location_type: Option<LocationType>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct LocationFilter {
    pub location_type: Option<LocationType>,
    pub is_active: Option<bool>,
}

/// Service for the location hierarchy
#[derive(Clone)]
pub struct LocationService {
    db: Arc<DbPool>,
    events: Arc<EventSender>,
}

impl LocationService {
    pub fn new(db: Arc<DbPool>, events: Arc<EventSender>) -> Self {
        Self { db, events }
    }

    fn repo(&self) -> Repository<'_, DbPool, location::Entity> {
        Repository::new(self.db.as_ref())
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, input: NewLocation) -> Result<location::Model, ServiceError> {
        input.validate()?;

        if let Some(parent_id) = input.parent_id {
            self.require_parent(parent_id).await?;
        }

        let created = self
            .repo()
            .insert(location::ActiveModel {
                code: Set(input.code.trim().to_string()),
                name: Set(input.name.trim().to_string()),
                location_type: Set(input.location_type),
                parent_id: Set(input.parent_id),
                description: Set(input.description),
                is_active: Set(true),
                ..Default::default()
            })
            .await?;

        counter!("stockscan_locations_created_total", 1);
        info!(location_id = %created.id, "location created");
        self.events.publish(Event::LocationCreated(created.id));
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<location::Model, ServiceError> {
        self.repo().get(id).await
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: LocationFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<location::Model>, ServiceError> {
        let mut select = location::Entity::find().order_by_asc(location::Column::Code);
        if let Some(kind) = filter.location_type {
            select = select.filter(location::Column::LocationType.eq(kind));
        }
        if let Some(active) = filter.is_active {
            select = select.filter(location::Column::IsActive.eq(active));
        }

        let (rows, total) = self.repo().page(select, page, per_page).await?;
        Ok(Page::new(rows, total, page, per_page))
    }

    /// Direct children of a location.
    #[instrument(skip(self))]
    pub async fn children(&self, id: Uuid) -> Result<Vec<location::Model>, ServiceError> {
        self.repo().get(id).await?;
        Ok(location::Entity::find()
            .filter(location::Column::ParentId.eq(id))
            .order_by_asc(location::Column::Code)
            .all(self.db.as_ref())
            .await?)
    }

    /// Applies a partial update. A reparenting locks the moved row, the new
    /// parent and its ancestors so that concurrent moves cannot close a loop.
    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: Uuid,
        if_match: Option<i32>,
        changes: LocationChanges,
    ) -> Result<location::Model, ServiceError> {
        changes.validate()?;
        let uow = UnitOfWork::begin(&self.db).await?;
        match Self::update_in(&uow, id, if_match, changes).await {
            Ok(updated) => {
                uow.commit().await?;
                Ok(updated)
            }
            Err(e) => {
                uow.rollback().await?;
                Err(e)
            }
        }
    }

    async fn update_in(
        uow: &UnitOfWork,
        id: Uuid,
        if_match: Option<i32>,
        changes: LocationChanges,
    ) -> Result<location::Model, ServiceError> {
        let locations = uow.repo::<location::Entity>();
        let new_parent = changes.parent_id.flatten();

        // Lock the pair in a fixed order so opposite moves queue instead of deadlocking.
        let current = match new_parent {
            Some(parent_id) if parent_id < id => {
                lock_parent(uow, parent_id).await?;
                locations.get_for_update(id).await?
            }
            Some(parent_id) => {
                let current = locations.get_for_update(id).await?;
                lock_parent(uow, parent_id).await?;
                current
            }
            None => locations.get_for_update(id).await?,
        };
        ensure_version(id, if_match, current.version)?;
        if let Some(parent_id) = new_parent {
            ensure_acyclic(uow, id, parent_id).await?;
        }

        let mut active = location::ActiveModel::default();
        if let Some(name) = changes.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(kind) = changes.location_type {
            active.location_type = Set(kind);
        }
        if let Some(parent) = changes.parent_id {
            active.parent_id = Set(parent);
        }
        if let Some(description) = changes.description {
            active.description = Set(description);
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }

        locations
            .update_versioned(id, expected_version(if_match, current.version), active)
            .await
    }

    /// Deletes an empty leaf location.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid, if_match: Option<i32>) -> Result<(), ServiceError> {
        let current = self.repo().get(id).await?;
        ensure_version(id, if_match, current.version)?;

        let items = inventory_item::Entity::find()
            .filter(inventory_item::Column::LocationId.eq(id))
            .count(self.db.as_ref())
            .await?;
        if items > 0 {
            return Err(ServiceError::Conflict(format!(
                "location {} still holds {} item(s)",
                current.code, items
            )));
        }

        let children = self
            .repo()
            .count(location::Entity::find().filter(location::Column::ParentId.eq(id)))
            .await?;
        if children > 0 {
            return Err(ServiceError::Conflict(format!(
                "location {} still has {} child location(s)",
                current.code, children
            )));
        }

        self.repo()
            .delete(id, expected_version(if_match, current.version))
            .await?;
        info!(location_id = %id, "location deleted");
        Ok(())
    }

    async fn require_parent(&self, parent_id: Uuid) -> Result<(), ServiceError> {
        if !self.repo().exists(parent_id).await? {
            return Err(ServiceError::BadRequest(format!(
                "parent location {} does not exist",
                parent_id
            )));
        }
        Ok(())
    }
}

async fn lock_parent(uow: &UnitOfWork, parent_id: Uuid) -> Result<location::Model, ServiceError> {
    match uow.repo::<location::Entity>().get_for_update(parent_id).await {
        Err(ServiceError::NotFound(_)) => Err(ServiceError::BadRequest(format!(
            "parent location {} does not exist",
            parent_id
        ))),
        other => other,
    }
}

/// Walks up from `new_parent` holding row locks; reaching `id` means the
/// move would close a loop.
async fn ensure_acyclic(uow: &UnitOfWork, id: Uuid, new_parent: Uuid) -> Result<(), ServiceError> {
    let locations = uow.repo::<location::Entity>();
    let mut seen = HashSet::new();
    let mut cursor = Some(new_parent);

    while let Some(current) = cursor {
        if current == id {
            return Err(ServiceError::BadRequest(
                "a location cannot be moved beneath itself".to_string(),
            ));
        }
        if !seen.insert(current) {
            break;
        }
        cursor = match locations.get_for_update(current).await {
            Ok(location) => location.parent_id,
            Err(ServiceError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
    }
    Ok(())
}
