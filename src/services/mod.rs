//! Business rules on top of the repositories.
//!
//! Services own every invariant that is not a schema constraint: lifecycle
//! guards, referential checks that need a friendlier error than a foreign
//! key violation, and event emission after commit.

use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;

pub mod items;
pub mod locations;
pub mod suppliers;
pub mod transactions;

pub use items::ItemService;
pub use locations::LocationService;
pub use suppliers::SupplierService;
pub use transactions::TransactionService;

/// Container for all services, cloned into the router state.
#[derive(Clone)]
pub struct AppServices {
    pub locations: Arc<LocationService>,
    pub suppliers: Arc<SupplierService>,
    pub items: Arc<ItemService>,
    pub transactions: Arc<TransactionService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, events: Arc<EventSender>) -> Self {
        Self {
            locations: Arc::new(LocationService::new(db.clone(), events.clone())),
            suppliers: Arc::new(SupplierService::new(db.clone(), events.clone())),
            items: Arc::new(ItemService::new(db.clone(), events.clone())),
            transactions: Arc::new(TransactionService::new(db, events)),
        }
    }
}

/// A page of rows plus the unpaged total.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, per_page: u64) -> Self {
        Self {
            items,
            total,
            page: page.max(1),
            per_page,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Version a write must match: the caller's `If-Match`, else the version just read.
pub(crate) fn expected_version(if_match: Option<i32>, current: i32) -> i32 {
    if_match.unwrap_or(current)
}

/// Fails fast on a stale `If-Match` before any other rule is evaluated.
pub(crate) fn ensure_version(id: Uuid, if_match: Option<i32>, current: i32) -> Result<(), ServiceError> {
    match if_match {
        Some(v) if v != current => Err(ServiceError::ConcurrentModification(id)),
        _ => Ok(()),
    }
}

/// Distinguishes an absent field from an explicit `null` in PATCH-style bodies.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub(crate) fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("blank"));
    }
    Ok(())
}
