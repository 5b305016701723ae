use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_locations_table::Migration),
            Box::new(m20240601_000002_create_suppliers_table::Migration),
            Box::new(m20240601_000003_create_inventory_items_table::Migration),
            Box::new(m20240601_000004_create_inventory_transactions_table::Migration),
        ]
    }
}

mod m20240601_000001_create_locations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_locations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Locations::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Locations::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Locations::Code).string_len(32).not_null())
                        .col(ColumnDef::new(Locations::Name).string_len(128).not_null())
                        .col(
                            ColumnDef::new(Locations::LocationType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Locations::ParentId).uuid().null())
                        .col(ColumnDef::new(Locations::Description).text().null())
                        .col(
                            ColumnDef::new(Locations::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Locations::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Locations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Locations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_locations_parent_id")
                                .from(Locations::Table, Locations::ParentId)
                                .to(Locations::Table, Locations::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("idx_locations_code")
                        .table(Locations::Table)
                        .col(Locations::Code)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_locations_parent_id")
                        .table(Locations::Table)
                        .col(Locations::ParentId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Locations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Locations {
        Table,
        Id,
        Code,
        Name,
        LocationType,
        ParentId,
        Description,
        IsActive,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_suppliers_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_suppliers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Suppliers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Suppliers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Suppliers::Code).string_len(32).not_null())
                        .col(ColumnDef::new(Suppliers::Name).string_len(128).not_null())
                        .col(ColumnDef::new(Suppliers::ContactName).string().null())
                        .col(ColumnDef::new(Suppliers::Email).string().null())
                        .col(ColumnDef::new(Suppliers::Phone).string().null())
                        .col(ColumnDef::new(Suppliers::Address).text().null())
                        .col(
                            ColumnDef::new(Suppliers::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Suppliers::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Suppliers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Suppliers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("idx_suppliers_code")
                        .table(Suppliers::Table)
                        .col(Suppliers::Code)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Suppliers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Suppliers {
        Table,
        Id,
        Code,
        Name,
        ContactName,
        Email,
        Phone,
        Address,
        IsActive,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000003_create_inventory_items_table {

    use super::m20240601_000001_create_locations_table::Locations;
    use super::m20240601_000002_create_suppliers_table::Suppliers;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_inventory_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryItems::Sku).string_len(64).not_null())
                        .col(
                            ColumnDef::new(InventoryItems::Barcode)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryItems::Name).string_len(255).not_null())
                        .col(ColumnDef::new(InventoryItems::Description).text().null())
                        .col(
                            ColumnDef::new(InventoryItems::Quantity)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(InventoryItems::Quantity).gte(0)),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::UnitCost)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0)
                                .check(Expr::col(InventoryItems::UnitCost).gte(0)),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::ReorderPoint)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(InventoryItems::ReorderPoint).gte(0)),
                        )
                        .col(ColumnDef::new(InventoryItems::LocationId).uuid().not_null())
                        .col(ColumnDef::new(InventoryItems::SupplierId).uuid().null())
                        .col(
                            ColumnDef::new(InventoryItems::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_items_location_id")
                                .from(InventoryItems::Table, InventoryItems::LocationId)
                                .to(Locations::Table, Locations::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_items_supplier_id")
                                .from(InventoryItems::Table, InventoryItems::SupplierId)
                                .to(Suppliers::Table, Suppliers::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("idx_inventory_items_sku")
                        .table(InventoryItems::Table)
                        .col(InventoryItems::Sku)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("idx_inventory_items_barcode")
                        .table(InventoryItems::Table)
                        .col(InventoryItems::Barcode)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_items_location_id")
                        .table(InventoryItems::Table)
                        .col(InventoryItems::LocationId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum InventoryItems {
        Table,
        Id,
        Sku,
        Barcode,
        Name,
        Description,
        Quantity,
        UnitCost,
        ReorderPoint,
        LocationId,
        SupplierId,
        IsActive,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000004_create_inventory_transactions_table {

    use super::m20240601_000001_create_locations_table::Locations;
    use super::m20240601_000003_create_inventory_items_table::InventoryItems;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_inventory_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::Reference)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryTransactions::ItemId).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryTransactions::TransactionType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::Quantity)
                                .integer()
                                .not_null()
                                .check(Expr::col(InventoryTransactions::Quantity).ne(0)),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::SourceLocationId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::DestinationLocationId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryTransactions::Notes).text().null())
                        .col(
                            ColumnDef::new(InventoryTransactions::FailureReason)
                                .text()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryTransactions::CreatedBy).string().null())
                        .col(ColumnDef::new(InventoryTransactions::ApprovedBy).string().null())
                        .col(
                            ColumnDef::new(InventoryTransactions::ProcessedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_transactions_item_id")
                                .from(InventoryTransactions::Table, InventoryTransactions::ItemId)
                                .to(InventoryItems::Table, InventoryItems::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_transactions_source_location_id")
                                .from(
                                    InventoryTransactions::Table,
                                    InventoryTransactions::SourceLocationId,
                                )
                                .to(Locations::Table, Locations::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_transactions_destination_location_id")
                                .from(
                                    InventoryTransactions::Table,
                                    InventoryTransactions::DestinationLocationId,
                                )
                                .to(Locations::Table, Locations::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("idx_inventory_transactions_reference")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::Reference)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_transactions_status")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_transactions_item_id")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::ItemId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(InventoryTransactions::Table)
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryTransactions {
        Table,
        Id,
        Reference,
        ItemId,
        TransactionType,
        Status,
        Quantity,
        SourceLocationId,
        DestinationLocationId,
        Notes,
        FailureReason,
        CreatedBy,
        ApprovedBy,
        ProcessedAt,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, DbConfig};

    #[tokio::test]
    async fn migrations_apply_and_revert_on_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig {
            url: format!("sqlite://{}?mode=rwc", dir.path().join("m.sqlite").display()),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let db = establish_connection_with_config(&config).await.unwrap();

        Migrator::up(&db, None).await.unwrap();
        let manager = SchemaManager::new(&db);
        assert!(manager.has_table("inventory_items").await.unwrap());
        assert!(manager.has_table("inventory_transactions").await.unwrap());

        Migrator::down(&db, None).await.unwrap();
        assert!(!manager.has_table("inventory_items").await.unwrap());

        Migrator::up(&db, None).await.unwrap();
        assert!(manager.has_table("locations").await.unwrap());
    }
}
