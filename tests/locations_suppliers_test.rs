//! Location hierarchy and supplier records.

mod common;

use axum::http::Method;
use common::{id_of, response_json, TestApp, EAN};
use serde_json::json;
use uuid::Uuid;

async fn create_child(app: &TestApp, code: &str, parent: Uuid, kind: &str) -> Uuid {
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/locations",
            Some(json!({
                "code": code,
                "name": code,
                "location_type": kind,
                "parent_id": parent,
            })),
        )
        .await;
    assert_eq!(response.status(), 201);
    id_of(&response_json(response).await)
}

#[tokio::test]
async fn children_are_listed_under_their_parent() {
    let app = TestApp::new().await;
    let warehouse = app.seed_location("WH-1").await;
    let zone = create_child(&app, "Z-1", warehouse, "Zone").await;
    create_child(&app, "Z-2", warehouse, "Zone").await;
    create_child(&app, "A-1", zone, "Aisle").await;

    let response = app
        .request_authenticated(
            Method::GET,
            &format!("/api/v1/locations/{}/children", warehouse),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn unknown_parent_is_rejected() {
    let app = TestApp::new().await;
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/locations",
            Some(json!({
                "code": "Z-9",
                "name": "Floating",
                "location_type": "Zone",
                "parent_id": Uuid::new_v4(),
            })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn reparenting_under_a_descendant_is_rejected() {
    let app = TestApp::new().await;
    let warehouse = app.seed_location("WH-1").await;
    let zone = create_child(&app, "Z-1", warehouse, "Zone").await;
    let aisle = create_child(&app, "A-1", zone, "Aisle").await;

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/locations/{}", warehouse),
            Some(json!({ "parent_id": aisle })),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/locations/{}", aisle),
            Some(json!({ "parent_id": null })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert!(body["data"]["parent_id"].is_null());
}

#[tokio::test]
async fn duplicate_location_code_is_a_conflict() {
    let app = TestApp::new().await;
    app.seed_location("WH-1").await;
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/locations",
            Some(json!({ "code": "WH-1", "name": "Again", "location_type": "Warehouse" })),
        )
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn occupied_location_cannot_be_deleted() {
    let app = TestApp::new().await;
    let warehouse = app.seed_location("WH-1").await;
    let zone = create_child(&app, "Z-1", warehouse, "Zone").await;
    app.seed_item("SKU-1", EAN, zone).await;

    let response = app
        .request_authenticated(Method::DELETE, &format!("/api/v1/locations/{}", warehouse), None)
        .await;
    assert_eq!(response.status(), 409, "has children");

    let response = app
        .request_authenticated(Method::DELETE, &format!("/api/v1/locations/{}", zone), None)
        .await;
    assert_eq!(response.status(), 409, "holds items");

    let empty = app.seed_location("WH-2").await;
    let response = app
        .request_authenticated(Method::DELETE, &format!("/api/v1/locations/{}", empty), None)
        .await;
    assert_eq!(response.status(), 204);
}

#[tokio::test]
async fn supplier_crud_round_trip() {
    let app = TestApp::new().await;
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/suppliers",
            Some(json!({
                "code": "ACME",
                "name": "Acme Fasteners",
                "email": "orders@acme.example",
            })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let supplier = id_of(&response_json(response).await);

    let response = app
        .request_authenticated(Method::GET, "/api/v1/suppliers?search=Acme", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/suppliers/{}", supplier),
            Some(json!({ "phone": "+1 555 0100" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["phone"], "+1 555 0100");

    let response = app
        .request_authenticated(Method::DELETE, &format!("/api/v1/suppliers/{}", supplier), None)
        .await;
    assert_eq!(response.status(), 204);

    let response = app
        .request_authenticated(Method::GET, &format!("/api/v1/suppliers/{}", supplier), None)
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn supplier_email_is_validated() {
    let app = TestApp::new().await;
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/suppliers",
            Some(json!({ "code": "BAD", "name": "Bad Email", "email": "not-an-email" })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn referenced_supplier_cannot_be_deleted() {
    let app = TestApp::new().await;
    let location = app.seed_location("WH-1").await;
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/suppliers",
            Some(json!({ "code": "ACME", "name": "Acme" })),
        )
        .await;
    let supplier = id_of(&response_json(response).await);

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/items",
            Some(json!({
                "sku": "SKU-1",
                "barcode": EAN,
                "name": "Bolt",
                "quantity": 1,
                "unit_cost": "0.10",
                "reorder_point": 0,
                "location_id": location,
                "supplier_id": supplier,
            })),
        )
        .await;
    assert_eq!(response.status(), 201);

    let response = app
        .request_authenticated(Method::DELETE, &format!("/api/v1/suppliers/{}", supplier), None)
        .await;
    assert_eq!(response.status(), 409);
}
