mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{id_of, TestApp};

#[tokio::test]
async fn vehicle_crud_lifecycle() {
    let app = TestApp::new().await;
    let customer_id = app.seed_customer("car@example.com").await;

    let created = app
        .create(
            "/api/v1/vehicles",
            json!({
                "make": "Toyota",
                "model": "Corolla",
                "year": 2020,
                "vin": "jtdbr32e720000001",
                "customerId": customer_id,
                "licensePlate": "ABC-123",
                "mileage": 42000
            }),
        )
        .await;
    let id = id_of(&created);
    assert_eq!(created["vin"], "JTDBR32E720000001");

    let (status, detail) = app.get(&format!("/api/v1/vehicles/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["displayName"], "2020 Toyota Corolla");
    assert_eq!(detail["customer"]["id"], customer_id.as_str());
    assert_eq!(detail["workOrders"], json!([]));

    let (status, updated) = app
        .put(&format!("/api/v1/vehicles/{id}"), json!({ "mileage": 43500 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["mileage"], 43500);

    let (status, listed) = app
        .get(&format!("/api/v1/vehicles?customerId={customer_id}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["customer"]["email"], "car@example.com");
    assert_eq!(listed[0]["_count"]["workOrders"], 0);

    let (status, body) = app.delete(&format!("/api/v1/vehicles/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
}

#[tokio::test]
async fn vin_is_unique() {
    let app = TestApp::new().await;
    let customer_id = app.seed_customer("vin@example.com").await;
    app.seed_vehicle(&customer_id, "WBA3A5C51CF000001").await;

    let (status, body) = app
        .post(
            "/api/v1/vehicles",
            json!({
                "make": "BMW",
                "model": "328i",
                "year": 2012,
                "vin": "WBA3A5C51CF000001",
                "customerId": customer_id
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "A vehicle with this VIN already exists");
}

#[tokio::test]
async fn vehicle_needs_an_existing_owner() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(
            "/api/v1/vehicles",
            json!({
                "make": "Ford",
                "model": "Focus",
                "year": 2015,
                "vin": "1FADP3F20FL000001",
                "customerId": "00000000-0000-4000-8000-000000000000"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Customer not found");
}

#[tokio::test]
async fn delete_is_blocked_by_active_work_orders() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("vbusy@example.com", "1FADP3F20FL000002").await;
    app.seed_work_order(&customer_id, &vehicle_id, json!([])).await;

    let (status, body) = app.delete(&format!("/api/v1/vehicles/{vehicle_id}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cannot delete vehicle with active work orders");
    assert_eq!(body["hasActiveWorkOrders"], true);
}

#[tokio::test]
async fn invoiced_work_orders_block_vehicle_delete() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("vowes@example.com", "1FADP3F20FL000003").await;
    let order = app.seed_work_order(&customer_id, &vehicle_id, json!([
        { "description": "Alignment", "quantity": 1, "unitPrice": "95.00" }
    ])).await;
    let work_order_id = id_of(&order);
    app.complete(&work_order_id).await;
    let invoice = app.invoice(&work_order_id).await;
    let uri = format!("/api/v1/vehicles/{vehicle_id}");

    let (status, body) = app.delete(&uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["hasActiveWorkOrders"], true);
    assert!(body.get("hasUnpaidInvoices").is_none());

    app.pay_in_full(&invoice).await;
    let (status, body) = app.delete(&uri).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}
