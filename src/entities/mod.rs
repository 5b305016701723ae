pub mod inventory_item;
pub mod inventory_transaction;
pub mod location;
pub mod supplier;

pub use inventory_item::Entity as InventoryItem;
pub use inventory_transaction::{
    Entity as InventoryTransaction, TransactionStatus, TransactionType,
};
pub use location::{Entity as Location, LocationType};
pub use supplier::Entity as Supplier;
