mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{id_of, TestApp};

#[tokio::test]
async fn technicians_are_created_listed_and_assigned() {
    let app = TestApp::new().await;

    let tech = app
        .create(
            "/api/v1/technicians",
            json!({ "name": "Sam Wrench", "email": "Sam@Garage.example" }),
        )
        .await;
    let tech_id = id_of(&tech);
    assert_eq!(tech["email"], "sam@garage.example");
    assert_eq!(tech["active"], true);

    let (status, body) = app
        .post(
            "/api/v1/technicians",
            json!({ "name": "Sam Again", "email": "sam@garage.example" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "A technician with this email already exists");

    let (customer_id, vehicle_id) = app.seed_owner("tech@example.com", "5YJSA1E26HF000001").await;
    let order = app
        .create(
            "/api/v1/work-orders",
            json!({
                "description": "Diagnostics",
                "startDate": "2026-03-02T08:00:00Z",
                "customerId": customer_id,
                "vehicleId": vehicle_id,
                "technicianId": tech_id
            }),
        )
        .await;
    assert_eq!(order["technician"]["name"], "Sam Wrench");

    let (status, listed) = app.get("/api/v1/technicians?active=true").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed[0]["workOrderCount"], 1);

    let (status, updated) = app
        .put(
            &format!("/api/v1/technicians/{tech_id}"),
            json!({ "active": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["active"], false);

    let (_, active) = app.get("/api/v1/technicians?active=true").await;
    assert_eq!(active, json!([]));

    let (status, unassigned) = app
        .put(
            &format!("/api/v1/work-orders/{}", id_of(&order)),
            json!({ "technicianId": null }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(unassigned["technicianId"].is_null());
}

#[tokio::test]
async fn appointments_are_scheduled_for_an_owned_vehicle() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("appt@example.com", "5YJSA1E26HF000002").await;

    let appointment = app
        .create(
            "/api/v1/appointments",
            json!({
                "startTime": "2026-04-10T09:00:00Z",
                "endTime": "2026-04-10T10:30:00Z",
                "customerId": customer_id,
                "vehicleId": vehicle_id,
                "notes": "Annual inspection"
            }),
        )
        .await;
    let id = id_of(&appointment);
    assert_eq!(appointment["status"], "SCHEDULED");
    assert_eq!(appointment["date"], "2026-04-10");
    assert_eq!(appointment["vehicle"]["id"], vehicle_id.as_str());

    let (status, on_day) = app.get("/api/v1/appointments?date=2026-04-10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(on_day.as_array().unwrap().len(), 1);
    let (_, other_day) = app.get("/api/v1/appointments?date=2026-04-11").await;
    assert_eq!(other_day, json!([]));

    let (status, confirmed) = app
        .put(
            &format!("/api/v1/appointments/{id}"),
            json!({ "status": "CONFIRMED" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{confirmed}");
    assert_eq!(confirmed["status"], "CONFIRMED");

    let (status, body) = app.delete(&format!("/api/v1/appointments/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    let (status, _) = app.get(&format!("/api/v1/appointments/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn appointment_window_must_be_positive() {
    let app = TestApp::new().await;
    let (customer_id, vehicle_id) = app.seed_owner("window@example.com", "5YJSA1E26HF000003").await;

    let (status, body) = app
        .post(
            "/api/v1/appointments",
            json!({
                "startTime": "2026-04-10T10:00:00Z",
                "endTime": "2026-04-10T09:00:00Z",
                "customerId": customer_id,
                "vehicleId": vehicle_id
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "endTime must be after startTime");
}
