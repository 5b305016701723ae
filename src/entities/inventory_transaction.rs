use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::repositories::TrackedEntity;

/// Kind of stock movement.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum TransactionType {
    #[sea_orm(string_value = "Receipt")]
    Receipt,
    #[sea_orm(string_value = "Issue")]
    Issue,
    #[sea_orm(string_value = "Transfer")]
    Transfer,
    #[sea_orm(string_value = "Adjustment")]
    Adjustment,
}

impl TransactionType {
    /// Adjustments carry a signed quantity; every other movement is positive.
    pub fn accepts_quantity(self, quantity: i32) -> bool {
        match self {
            TransactionType::Adjustment => quantity != 0,
            _ => quantity > 0,
        }
    }
}

/// Lifecycle state of a transaction.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Approved")]
    Approved,
    #[sea_orm(string_value = "Processing")]
    Processing,
    #[sea_orm(string_value = "Completed")]
    Completed,
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
    #[sea_orm(string_value = "Failed")]
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Cancelled | TransactionStatus::Failed
        )
    }

    /// The only edges of the lifecycle graph.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Cancelled)
                | (Approved, Cancelled)
                | (Approved, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// States a transaction can still leave; used to block item deletion.
    pub fn open_states() -> [TransactionStatus; 3] {
        [
            TransactionStatus::Pending,
            TransactionStatus::Approved,
            TransactionStatus::Processing,
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub reference: String,
    pub item_id: Uuid,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub quantity: i32,
    pub source_location_id: Option<Uuid>,
    pub destination_location_id: Option<Uuid>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub failure_reason: Option<String>,
    pub created_by: Option<String>,
    pub approved_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_item::Entity",
        from = "Column::ItemId",
        to = "super::inventory_item::Column::Id",
        on_delete = "Restrict"
    )]
    InventoryItem,
    #[sea_orm(
        belongs_to = "super::location::Entity",
        from = "Column::SourceLocationId",
        to = "super::location::Column::Id",
        on_delete = "SetNull"
    )]
    SourceLocation,
    #[sea_orm(
        belongs_to = "super::location::Entity",
        from = "Column::DestinationLocationId",
        to = "super::location::Column::Id",
        on_delete = "SetNull"
    )]
    DestinationLocation,
}

impl Related<super::inventory_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryItem.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.reference {
                active_model.reference = Set(generate_reference(now));
            }
            if let ActiveValue::NotSet = active_model.version {
                active_model.version = Set(1);
            }
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}

impl TrackedEntity for Entity {
    fn id_column() -> Column {
        Column::Id
    }

    fn version_column() -> Column {
        Column::Version
    }

    fn updated_at_column() -> Column {
        Column::UpdatedAt
    }
}

/// Human-readable reference, e.g. `TX-20240611-9F2C01AB`.
pub fn generate_reference(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "TX-{}-{}",
        at.format("%Y%m%d"),
        suffix[..8].to_ascii_uppercase()
    )
}
