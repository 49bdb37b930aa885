mod common;

use axum::http::StatusCode;
use rust_decimal_macros::dec;
use serde_json::json;

use common::{id_of, money, TestApp};

#[tokio::test]
async fn part_lifecycle_with_ledger() {
    let app = TestApp::new().await;

    let created = app
        .create(
            "/api/v1/inventory",
            json!({
                "partNumber": "OIL-5W30",
                "name": "Synthetic oil 5W-30",
                "category": "Fluids",
                "quantity": 12,
                "minQuantity": 4,
                "costPrice": "6.50",
                "sellingPrice": "11.25"
            }),
        )
        .await;
    let id = id_of(&created);
    assert_eq!(created["quantity"], 12);
    assert_eq!(money(&created["sellingPrice"]), dec!(11.25));

    let (status, detail) = app.get(&format!("/api/v1/inventory/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["lowStock"], false);
    let ledger = detail["transactions"].as_array().unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0]["type"], "PURCHASE");
    assert_eq!(ledger[0]["quantity"], 12);

    let (status, adjusted) = app
        .post(
            &format!("/api/v1/inventory/{id}/adjust"),
            json!({ "type": "ADJUSTMENT", "quantity": -9, "notes": "cycle count" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{adjusted}");
    assert_eq!(adjusted["quantity"], 3);
    assert_eq!(adjusted["lowStock"], true);

    let (status, updated) = app
        .put(
            &format!("/api/v1/inventory/{id}"),
            json!({ "location": "Shelf B2", "quantity": 500 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["location"], "Shelf B2");
    assert_eq!(updated["quantity"], 3);

    let (status, low) = app.get("/api/v1/inventory?lowStock=true").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(low.as_array().unwrap().len(), 1);

    let (status, body) = app.delete(&format!("/api/v1/inventory/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
}

#[tokio::test]
async fn adjustments_cannot_overdraw_stock() {
    let app = TestApp::new().await;
    let id = app.seed_part("FLT-1", 2, "9.00").await;

    let (status, body) = app
        .post(
            &format!("/api/v1/inventory/{id}/adjust"),
            json!({ "type": "ADJUSTMENT", "quantity": -3 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Insufficient stock for part FLT-1");
    assert_eq!(app.part_quantity(&id).await, 2);

    let (status, body) = app
        .post(
            &format!("/api/v1/inventory/{id}/adjust"),
            json!({ "type": "SALE", "quantity": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "SALE transactions are recorded through work orders"
    );
}

#[tokio::test]
async fn out_of_range_movements_are_rejected() {
    let app = TestApp::new().await;
    let id = app.seed_part("FLT-9", 2_000_000_000, "9.00").await;
    let uri = format!("/api/v1/inventory/{id}/adjust");

    let (status, body) = app
        .post(&uri, json!({ "type": "ADJUSTMENT", "quantity": i32::MIN }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "quantity is out of range");

    let (status, body) = app
        .post(&uri, json!({ "type": "PURCHASE", "quantity": 2_000_000_000 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Stock for part FLT-9 would exceed the maximum quantity"
    );

    assert_eq!(app.part_quantity(&id).await, 2_000_000_000);
    assert_eq!(app.ledger_len(&id).await, 1);
}

#[tokio::test]
async fn negative_stock_stops_at_the_i32_floor() {
    let app = TestApp::with_config(|cfg| cfg.inventory_allow_negative_stock = true).await;
    let id = app.seed_part("FLT-10", 0, "9.00").await;
    let uri = format!("/api/v1/inventory/{id}/adjust");

    let (status, body) = app
        .post(&uri, json!({ "type": "ADJUSTMENT", "quantity": -2_000_000_000 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app
        .post(&uri, json!({ "type": "ADJUSTMENT", "quantity": -2_000_000_000 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Insufficient stock for part FLT-10");
    assert_eq!(app.part_quantity(&id).await, -2_000_000_000);
}

#[tokio::test]
async fn negative_stock_can_be_enabled() {
    let app = TestApp::with_config(|cfg| cfg.inventory_allow_negative_stock = true).await;
    let id = app.seed_part("FLT-2", 1, "9.00").await;

    let (status, body) = app
        .post(
            &format!("/api/v1/inventory/{id}/adjust"),
            json!({ "type": "ADJUSTMENT", "quantity": -3 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["quantity"], -2);
}

#[tokio::test]
async fn part_numbers_are_unique() {
    let app = TestApp::new().await;
    app.seed_part("DUP-1", 1, "1.00").await;

    let (status, body) = app
        .post(
            "/api/v1/inventory",
            json!({ "partNumber": "DUP-1", "name": "Again", "costPrice": "1", "sellingPrice": "2" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "A part with this part number already exists");
}

#[tokio::test]
async fn parts_on_work_orders_cannot_be_deleted() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("parts@example.com", "JH4KA8260MC000001").await;
    let part = app.seed_part("USED-1", 5, "10.00").await;
    app.seed_work_order(
        &customer_id,
        &vehicle_id,
        json!([{ "description": "Used", "quantity": 1, "unitPrice": "10.00", "partId": part }]),
    )
    .await;

    let (status, body) = app.delete(&format!("/api/v1/inventory/{part}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cannot delete a part that is used on work orders");
}
