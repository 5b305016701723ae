//! Item catalogue and barcode scanning over HTTP.

mod common;

use axum::http::Method;
use common::{etag_of, response_json, TestApp, EAN};
use serde_json::json;

#[tokio::test]
async fn create_then_fetch_item_with_etag() {
    let app = TestApp::new().await;
    let location = app.seed_location("WH-1").await;
    let item = app.seed_item("SKU-1", EAN, location).await;
    let id = item["id"].as_str().expect("item id");

    assert_eq!(item["quantity"], 10);
    assert_eq!(item["version"], 1);
    assert_eq!(item["low_stock"], false);

    let response = app
        .request_authenticated(Method::GET, &format!("/api/v1/items/{}", id), None)
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(etag_of(&response), "\"1\"");
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["sku"], "SKU-1");
}

#[tokio::test]
async fn scan_normalizes_scanner_framing() {
    let app = TestApp::new().await;
    let location = app.seed_location("WH-1").await;
    app.seed_item("SKU-1", EAN, location).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/items/scan",
            Some(json!({ "barcode": format!("]E0{}\r\n", EAN) })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["barcode"], EAN);

    let response = app
        .request_authenticated(Method::GET, &format!("/api/v1/items/barcode/{}", EAN), None)
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn scan_rejects_bad_check_digit_and_unknown_codes() {
    let app = TestApp::new().await;
    let location = app.seed_location("WH-1").await;
    app.seed_item("SKU-1", EAN, location).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/items/scan",
            Some(json!({ "barcode": "4006381333932" })),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/items/scan",
            Some(json!({ "barcode": "036000291452" })),
        )
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn duplicate_barcode_is_a_conflict() {
    let app = TestApp::new().await;
    let location = app.seed_location("WH-1").await;
    app.seed_item("SKU-1", EAN, location).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/items",
            Some(json!({
                "sku": "SKU-2",
                "barcode": EAN,
                "name": "Second",
                "quantity": 1,
                "unit_cost": "1.00",
                "reorder_point": 0,
                "location_id": location,
            })),
        )
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn create_item_requires_known_location() {
    let app = TestApp::new().await;
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/items",
            Some(json!({
                "sku": "SKU-1",
                "barcode": EAN,
                "name": "Orphan",
                "quantity": 1,
                "unit_cost": "1.00",
                "reorder_point": 0,
                "location_id": uuid::Uuid::new_v4(),
            })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = TestApp::new().await;
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/items",
            Some(json!({ "sku": "SKU-1" })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn quantity_cannot_be_edited_directly() {
    let app = TestApp::new().await;
    let location = app.seed_location("WH-1").await;
    let item = app.seed_item("SKU-1", EAN, location).await;
    let id = item["id"].as_str().expect("item id");

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/items/{}", id),
            Some(json!({ "quantity": 500 })),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/items/{}", id),
            Some(json!({ "name": "Renamed" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(etag_of(&response), "\"2\"");
    let body = response_json(response).await;
    assert_eq!(body["data"]["name"], "Renamed");
    assert_eq!(body["data"]["quantity"], 10);
}

#[tokio::test]
async fn adjust_stock_clamps_and_flags_low_stock() {
    let app = TestApp::new().await;
    let location = app.seed_location("WH-1").await;
    let item = app.seed_item("SKU-1", EAN, location).await;
    let id = item["id"].as_str().expect("item id");

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/items/{}/adjust", id),
            Some(json!({ "delta": -25, "reason": "cycle count" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["previous_quantity"], 10);
    assert_eq!(body["data"]["item"]["quantity"], 0);
    assert_eq!(body["data"]["item"]["low_stock"], true);
    assert_eq!(body["data"]["transaction"]["status"], "Completed");
    assert_eq!(body["data"]["transaction"]["transaction_type"], "Adjustment");
    assert_eq!(body["data"]["transaction"]["created_by"], "test-admin");

    let response = app
        .request_authenticated(Method::GET, "/api/v1/items/low-stock", None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], id);
}

#[tokio::test]
async fn zero_adjustment_is_rejected() {
    let app = TestApp::new().await;
    let location = app.seed_location("WH-1").await;
    let item = app.seed_item("SKU-1", EAN, location).await;
    let id = item["id"].as_str().expect("item id");

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/items/{}/adjust", id),
            Some(json!({ "delta": 0 })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn list_items_filters_and_paginates() {
    let app = TestApp::new().await;
    let north = app.seed_location("WH-N").await;
    let south = app.seed_location("WH-S").await;
    app.seed_item("SKU-1", EAN, north).await;
    app.seed_item("SKU-2", "036000291452", north).await;
    app.seed_item("SKU-3", "73513537", south).await;

    let response = app
        .request_authenticated(
            Method::GET,
            &format!("/api/v1/items?location_id={}&per_page=1", north),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["per_page"], 1);
    assert_eq!(body["data"]["total_pages"], 2);
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn delete_item_then_lookup_is_not_found() {
    let app = TestApp::new().await;
    let location = app.seed_location("WH-1").await;
    let item = app.seed_item("SKU-1", EAN, location).await;
    let id = item["id"].as_str().expect("item id");

    let response = app
        .request_authenticated(Method::DELETE, &format!("/api/v1/items/{}", id), None)
        .await;
    assert_eq!(response.status(), 204);

    let response = app
        .request_authenticated(Method::GET, &format!("/api/v1/items/{}", id), None)
        .await;
    assert_eq!(response.status(), 404);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Not Found");
}

#[tokio::test]
async fn out_of_range_page_is_a_bad_request() {
    let app = TestApp::new().await;
    let response = app
        .request_authenticated(
            Method::GET,
            "/api/v1/items?page=18446744073709551615&per_page=20",
            None,
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = app
        .request_authenticated(Method::GET, "/api/v1/items?page=5000&per_page=20", None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(0));
}
