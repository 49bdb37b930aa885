mod common;

use axum::http::{Method, StatusCode};
use chrono::{DateTime, Duration, Utc};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use common::{id_of, money, TestApp};

fn line(description: &str, price: &str) -> Value {
    json!([{ "description": description, "quantity": 1, "unitPrice": price }])
}

async fn set_status(app: &TestApp, work_order_id: &str, status: &str) {
    let (code, body) = app
        .put(
            &format!("/api/v1/work-orders/{work_order_id}"),
            json!({ "status": status }),
        )
        .await;
    assert_eq!(code, StatusCode::OK, "{body}");
}

async fn book(
    app: &TestApp,
    customer_id: &str,
    vehicle_id: &str,
    start: DateTime<Utc>,
) -> String {
    let appointment = app
        .create(
            "/api/v1/appointments",
            json!({
                "startTime": start,
                "endTime": start + Duration::minutes(30),
                "customerId": customer_id,
                "vehicleId": vehicle_id
            }),
        )
        .await;
    id_of(&appointment)
}

#[tokio::test]
async fn empty_shop_has_zeroed_summary() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/v1/dashboard").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["counts"]["customers"], 0);
    assert_eq!(body["counts"]["lowStockItems"], 0);
    assert_eq!(body["todaysAppointments"], json!([]));
    assert_eq!(body["recentWorkOrders"], json!([]));
    assert_eq!(money(&body["recentWorkOrdersTotal"]), dec!(0));

    let months = body["monthlySales"].as_array().unwrap();
    assert_eq!(months.len(), 6);
    assert!(months.iter().all(|m| money(&m["total"]) == dec!(0)));
    assert_eq!(months[5]["month"], Utc::now().format("%Y-%m").to_string());
}

#[tokio::test]
async fn summary_reflects_shop_activity() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("dash@example.com", "1HGCM82633A000001").await;

    let filter = app.seed_part("FLT-1", 3, "10.00").await;
    app.seed_part("PAD-1", 10, "40.00").await;

    let pending = app
        .seed_work_order(
            &customer_id,
            &vehicle_id,
            json!([{ "description": "Filter", "quantity": 1, "unitPrice": "10.00", "partId": filter }]),
        )
        .await;

    let underway = app
        .seed_work_order(&customer_id, &vehicle_id, line("Diagnosis", "20.00"))
        .await;
    set_status(&app, &id_of(&underway), "WAITING_FOR_PARTS").await;

    let invoiced = app
        .seed_work_order(&customer_id, &vehicle_id, line("Brakes", "100.00"))
        .await;
    app.complete(&id_of(&invoiced)).await;
    let kept = app.invoice(&id_of(&invoiced)).await;

    let reinvoiced = app
        .seed_work_order(&customer_id, &vehicle_id, line("Alignment", "50.00"))
        .await;
    app.complete(&id_of(&reinvoiced)).await;
    let voided = app.invoice(&id_of(&reinvoiced)).await;
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/invoices/{}/void", id_of(&voided)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let canceled = app
        .seed_work_order(&customer_id, &vehicle_id, line("Detailing", "7.00"))
        .await;
    set_status(&app, &id_of(&canceled), "CANCELED").await;

    let today = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc();
    let this_morning = book(&app, &customer_id, &vehicle_id, today).await;
    book(&app, &customer_id, &vehicle_id, today + Duration::days(2)).await;
    let called_off = book(&app, &customer_id, &vehicle_id, today + Duration::days(3)).await;
    let (status, _) = app
        .put(
            &format!("/api/v1/appointments/{called_off}"),
            json!({ "status": "CANCELED" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/api/v1/dashboard").await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let counts = &body["counts"];
    assert_eq!(counts["customers"], 1);
    assert_eq!(counts["vehicles"], 1);
    assert_eq!(counts["workOrders"], 5);
    assert_eq!(counts["activeWorkOrders"], 2);
    assert_eq!(counts["appointments"], 3);
    assert_eq!(counts["upcomingAppointments"], 1);
    assert_eq!(counts["inventoryItems"], 2);
    assert_eq!(counts["lowStockItems"], 1);

    let todays = body["todaysAppointments"].as_array().unwrap();
    assert_eq!(todays.len(), 1);
    assert_eq!(todays[0]["id"], this_morning.as_str());

    let recent = body["recentWorkOrders"].as_array().unwrap();
    assert_eq!(recent.len(), 4);
    assert!(recent.iter().any(|wo| wo["id"] == pending["id"]));
    assert!(recent.iter().all(|wo| wo["id"] != canceled["id"]));
    assert_eq!(money(&body["recentWorkOrdersTotal"]), dec!(180));

    let incomplete = body["incompleteWorkOrders"].as_array().unwrap();
    assert_eq!(incomplete.len(), 1);
    assert_eq!(incomplete[0]["id"], underway["id"]);

    let months = body["monthlySales"].as_array().unwrap();
    assert_eq!(months[5]["month"], Utc::now().format("%Y-%m").to_string());
    assert_eq!(money(&months[5]["total"]), money(&kept["total"]));
    assert_eq!(money(&months[5]["total"]), dec!(110));
}
