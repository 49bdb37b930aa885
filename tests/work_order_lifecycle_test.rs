mod common;

use axum::http::StatusCode;
use rust_decimal_macros::dec;
use serde_json::json;

use common::{id_of, money, TestApp};

#[tokio::test]
async fn creating_a_work_order_prices_lines_and_takes_stock() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("wo@example.com", "1FTFW1ET5DFC10312").await;
    let pads = app.seed_part("BP-100", 10, "40.00").await;

    let order = app
        .seed_work_order(
            &customer_id,
            &vehicle_id,
            json!([
                { "description": "Brake pads", "quantity": 2, "unitPrice": "40.00", "partId": pads },
                { "description": "Labor", "quantity": 1, "unitPrice": "0", "laborHours": "1.5", "laborRate": "100.00" }
            ]),
        )
        .await;

    assert_eq!(order["status"], "PENDING");
    assert!(order["orderNumber"].as_str().unwrap().starts_with("WO-"));
    assert_eq!(order["customer"]["id"], customer_id.as_str());
    assert_eq!(order["vehicle"]["id"], vehicle_id.as_str());

    let lines = order["lineItems"].as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(money(&lines[0]["cost"]), dec!(80));
    assert_eq!(lines[0]["part"]["partNumber"], "BP-100");
    assert_eq!(money(&lines[1]["cost"]), dec!(150));

    assert_eq!(money(&order["totals"]["subtotal"]), dec!(230));
    assert_eq!(money(&order["totals"]["tax"]), dec!(23));
    assert_eq!(money(&order["totals"]["total"]), dec!(253));

    assert_eq!(app.part_quantity(&pads).await, 8);

    let (_, part) = app.get(&format!("/api/v1/inventory/{pads}")).await;
    let ledger = part["transactions"].as_array().unwrap();
    let sale = ledger
        .iter()
        .find(|t| t["type"] == "SALE")
        .expect("sale transaction");
    assert_eq!(sale["quantity"], 2);
    assert_eq!(
        sale["notes"],
        format!("Used in Work Order {}", order["orderNumber"].as_str().unwrap())
    );
}

#[tokio::test]
async fn insufficient_stock_rolls_back_the_whole_order() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("short@example.com", "1FTFW1ET5DFC10313").await;
    let filter = app.seed_part("OF-1", 5, "12.00").await;
    let rotor = app.seed_part("RT-1", 1, "90.00").await;

    let (status, body) = app
        .post(
            "/api/v1/work-orders",
            json!({
                "description": "Service",
                "startDate": "2026-03-01T09:00:00Z",
                "customerId": customer_id,
                "vehicleId": vehicle_id,
                "lineItems": [
                    { "description": "Oil filter", "quantity": 1, "unitPrice": "12.00", "partId": filter },
                    { "description": "Rotors", "quantity": 2, "unitPrice": "90.00", "partId": rotor }
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Insufficient stock for part RT-1");

    assert_eq!(app.part_quantity(&filter).await, 5);
    assert_eq!(app.part_quantity(&rotor).await, 1);
    let (_, orders) = app.get("/api/v1/work-orders").await;
    assert_eq!(orders, json!([]));
}

#[tokio::test]
async fn unknown_part_is_not_found() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("ghost@example.com", "1FTFW1ET5DFC10314").await;
    let part_id = app.seed_part("OIL-5W30", 10, "8.00").await;

    let (status, body) = app
        .post(
            "/api/v1/work-orders",
            json!({
                "description": "Service",
                "startDate": "2026-03-01T09:00:00Z",
                "customerId": customer_id,
                "vehicleId": vehicle_id,
                "lineItems": [
                    { "description": "Oil", "quantity": 4, "unitPrice": "8.00", "partId": part_id },
                    { "description": "Ghost", "quantity": 1, "unitPrice": "1.00",
                      "partId": "00000000-0000-4000-8000-000000000000" }
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Part not found");

    assert_eq!(app.part_quantity(&part_id).await, 10);
    let (_, orders) = app.get("/api/v1/work-orders").await;
    assert_eq!(orders.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn unrepresentable_amounts_are_rejected_up_front() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("huge@example.com", "1FTFW1ET5DFC10320").await;

    let (status, body) = app
        .post(
            "/api/v1/work-orders",
            json!({
                "description": "Gold plated everything",
                "startDate": "2026-03-01T09:00:00Z",
                "customerId": customer_id,
                "vehicleId": vehicle_id,
                "lineItems": [
                    { "description": "Bullion", "quantity": i32::MAX, "unitPrice": "40000000000000000000" }
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Line item amounts are too large");

    let (status, orders) = app.get("/api/v1/work-orders").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders, json!([]));
}

#[tokio::test]
async fn per_part_totals_beyond_i32_leave_stock_alone() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("bulk@example.com", "1FTFW1ET5DFC10321").await;
    let bolts = app.seed_part("BOLT-1", 10, "0.01").await;

    let order = app
        .seed_work_order(
            &customer_id,
            &vehicle_id,
            json!([{ "description": "Bolts", "quantity": 2, "unitPrice": "0.01", "partId": bolts }]),
        )
        .await;
    let id = id_of(&order);
    assert_eq!(app.part_quantity(&bolts).await, 8);
    let ledger_before = app.ledger_len(&bolts).await;

    let (status, body) = app
        .put(
            &format!("/api/v1/work-orders/{id}"),
            json!({
                "lineItems": [
                    { "description": "Bolts", "quantity": 2_000_000_000, "unitPrice": "0.01", "partId": bolts },
                    { "description": "More bolts", "quantity": 2_000_000_000, "unitPrice": "0.01", "partId": bolts }
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Total quantity for a part is too large");

    assert_eq!(app.part_quantity(&bolts).await, 8);
    assert_eq!(app.ledger_len(&bolts).await, ledger_before);
    let (_, detail) = app.get(&format!("/api/v1/work-orders/{id}")).await;
    assert_eq!(detail["lineItems"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn vehicle_must_belong_to_customer() {
    let app = TestApp::new().await;
    let (customer_id, _) = app.seed_owner("a@example.com", "1FTFW1ET5DFC10315").await;
    let (_, other_vehicle) = app.seed_owner("b@example.com", "1FTFW1ET5DFC10316").await;

    let (status, body) = app
        .post(
            "/api/v1/work-orders",
            json!({
                "description": "Wrong car",
                "startDate": "2026-03-01T09:00:00Z",
                "customerId": customer_id,
                "vehicleId": other_vehicle
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["error"],
        "Vehicle not found or does not belong to this customer"
    );
}

#[tokio::test]
async fn replacing_line_items_moves_only_the_difference() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("edit@example.com", "1FTFW1ET5DFC10317").await;
    let pads = app.seed_part("BP-200", 10, "40.00").await;
    let wipers = app.seed_part("WB-1", 10, "15.00").await;

    let order = app
        .seed_work_order(
            &customer_id,
            &vehicle_id,
            json!([{ "description": "Pads", "quantity": 4, "unitPrice": "40.00", "partId": pads }]),
        )
        .await;
    let id = id_of(&order);
    let line_id = order["lineItems"][0]["id"].as_str().unwrap().to_string();
    assert_eq!(app.part_quantity(&pads).await, 6);

    let (status, updated) = app
        .put(
            &format!("/api/v1/work-orders/{id}"),
            json!({
                "lineItems": [
                    { "id": line_id, "description": "Pads", "quantity": 1, "unitPrice": "40.00", "partId": pads },
                    { "description": "Wipers", "quantity": 2, "unitPrice": "15.00", "partId": wipers }
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["lineItems"][0]["id"], line_id.as_str());
    assert_eq!(money(&updated["totals"]["subtotal"]), dec!(70));

    assert_eq!(app.part_quantity(&pads).await, 9);
    assert_eq!(app.part_quantity(&wipers).await, 8);

    let (_, part) = app.get(&format!("/api/v1/inventory/{pads}")).await;
    assert!(part["transactions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|t| t["type"] == "RETURN" && t["quantity"] == 3));
}

#[tokio::test]
async fn status_transitions_are_enforced() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("flow@example.com", "1FTFW1ET5DFC10318").await;
    let order = app.seed_work_order(&customer_id, &vehicle_id, json!([])).await;
    let uri = format!("/api/v1/work-orders/{}", id_of(&order));

    let (status, body) = app.put(&uri, json!({ "status": "PAID" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Status PAID is set by invoicing and payments");

    let (status, body) = app.put(&uri, json!({ "status": "IN_PROGRESS" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "IN_PROGRESS");
    assert!(body["completionDate"].is_null());

    let (status, body) = app.put(&uri, json!({ "status": "COMPLETED" })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["completionDate"].is_string());

    let (status, _) = app.put(&uri, json!({ "status": "CANCELED" })).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.put(&uri, json!({ "status": "PENDING" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cannot change status from CANCELED to PENDING");
}

#[tokio::test]
async fn deleting_a_work_order_returns_its_parts() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("del@example.com", "1FTFW1ET5DFC10319").await;
    let pads = app.seed_part("BP-300", 5, "40.00").await;
    let order = app
        .seed_work_order(
            &customer_id,
            &vehicle_id,
            json!([{ "description": "Pads", "quantity": 3, "unitPrice": "40.00", "partId": pads }]),
        )
        .await;
    assert_eq!(app.part_quantity(&pads).await, 2);

    let (status, body) = app
        .delete(&format!("/api/v1/work-orders/{}", id_of(&order)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    assert_eq!(app.part_quantity(&pads).await, 5);
}

#[tokio::test]
async fn list_filters_by_status_and_search() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("list@example.com", "1FTFW1ET5DFC10320").await;
    let first = app.seed_work_order(&customer_id, &vehicle_id, json!([])).await;
    app.seed_work_order(&customer_id, &vehicle_id, json!([])).await;
    app.complete(&id_of(&first)).await;

    let (status, completed) = app.get("/api/v1/work-orders?status=COMPLETED").await;
    assert_eq!(status, StatusCode::OK);
    let completed = completed.as_array().unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0]["id"], first["id"]);
    assert_eq!(completed[0]["lineItemCount"], 0);

    let number = first["orderNumber"].as_str().unwrap();
    let (_, found) = app
        .get(&format!("/api/v1/work-orders?query={}", number.to_lowercase()))
        .await;
    assert_eq!(found.as_array().unwrap().len(), 1);

    let (_, mine) = app
        .get(&format!("/api/v1/work-orders?customerId={customer_id}"))
        .await;
    assert_eq!(mine.as_array().unwrap().len(), 2);
}
