use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "StockScan API",
        version = "0.1.0",
        description = r#"
# StockScan Inventory API

Barcode-driven inventory tracking: items, storage locations, suppliers and
stock movements.

## Authentication

Every `/api/v1` endpoint requires a JWT issued for this service:

```
Authorization: Bearer <your-jwt-token>
```

## Concurrency

Single-resource responses carry an `ETag` holding the row version. Send it
back in `If-Match` on writes; a stale tag yields `409 Conflict`.

## Transactions

Movements are recorded `Pending`, approved, then processed. Processing applies
the stock change; quantities never drop below zero.

## Rate Limiting

Responses carry `X-RateLimit-Limit`, `X-RateLimit-Remaining` and
`X-RateLimit-Reset`. Exceeding the budget yields `429 Too Many Requests`.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "locations", description = "Storage location hierarchy"),
        (name = "suppliers", description = "Supplier records"),
        (name = "items", description = "Inventory items and barcode lookup"),
        (name = "transactions", description = "Stock movements and their lifecycle")
    ),
    paths(
        crate::handlers::locations::list_locations,
        crate::handlers::locations::get_location,
        crate::handlers::locations::location_children,
        crate::handlers::locations::create_location,
        crate::handlers::locations::update_location,
        crate::handlers::locations::delete_location,

        crate::handlers::suppliers::list_suppliers,
        crate::handlers::suppliers::get_supplier,
        crate::handlers::suppliers::create_supplier,
        crate::handlers::suppliers::update_supplier,
        crate::handlers::suppliers::delete_supplier,

        crate::handlers::items::list_items,
        crate::handlers::items::low_stock_items,
        crate::handlers::items::get_item,
        crate::handlers::items::get_item_by_barcode,
        crate::handlers::items::scan_item,
        crate::handlers::items::create_item,
        crate::handlers::items::update_item,
        crate::handlers::items::delete_item,
        crate::handlers::items::adjust_stock,

        crate::handlers::transactions::list_transactions,
        crate::handlers::transactions::get_transaction,
        crate::handlers::transactions::create_transaction,
        crate::handlers::transactions::approve_transaction,
        crate::handlers::transactions::process_transaction,
        crate::handlers::transactions::cancel_transaction,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::entities::LocationType,
            crate::entities::TransactionType,
            crate::entities::TransactionStatus,
            crate::barcode::Symbology,

            crate::handlers::locations::LocationResponse,
            crate::services::locations::NewLocation,
            crate::services::locations::LocationChanges,

            crate::handlers::suppliers::SupplierResponse,
            crate::services::suppliers::NewSupplier,
            crate::services::suppliers::SupplierChanges,

            crate::handlers::items::ItemResponse,
            crate::handlers::items::ScanRequest,
            crate::handlers::items::AdjustStockRequest,
            crate::handlers::items::StockAdjustmentResponse,
            crate::services::items::NewItem,
            crate::services::items::ItemChanges,

            crate::handlers::transactions::TransactionResponse,
            crate::services::transactions::NewTransaction,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_resource() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("StockScan API"));
        for path in [
            "/api/v1/locations/{id}/children",
            "/api/v1/suppliers",
            "/api/v1/items/scan",
            "/api/v1/items/{id}/adjust",
            "/api/v1/transactions/{id}/process",
        ] {
            assert!(json.contains(path), "missing {path}");
        }
        assert!(json.contains("bearer_auth"));
    }
}
