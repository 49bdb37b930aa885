#![allow(dead_code)]

use std::str::FromStr;

use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use garage_api::{
    app,
    config::AppConfig,
    db, events,
    entities::{work_order, WorkOrderStatus},
    AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Application backed by a throwaway SQLite file, driven in-process.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app after letting the caller tweak the configuration.
    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("garage_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 4;
        cfg.db_min_connections = 1;
        cfg.tax_rate = dec!(0.10);
        tweak(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);
        let router = app(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
            _dir: dir,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response")
    }

    /// Sends the request and returns the status with the decoded JSON body.
    pub async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let response = self.request(method, uri, body).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::PUT, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, None).await
    }

    /// POSTs and asserts a 201, returning the created body.
    pub async fn create(&self, uri: &str, body: Value) -> Value {
        let (status, created) = self.post(uri, body).await;
        assert_eq!(status, StatusCode::CREATED, "create {uri} failed: {created}");
        created
    }

    pub async fn seed_customer(&self, email: &str) -> String {
        let customer = self
            .create(
                "/api/v1/customers",
                json!({
                    "firstName": "Jane",
                    "lastName": "Doe",
                    "email": email,
                    "phone": "555-0100"
                }),
            )
            .await;
        id_of(&customer)
    }

    pub async fn seed_vehicle(&self, customer_id: &str, vin: &str) -> String {
        let vehicle = self
            .create(
                "/api/v1/vehicles",
                json!({
                    "make": "Honda",
                    "model": "Civic",
                    "year": 2019,
                    "vin": vin,
                    "customerId": customer_id
                }),
            )
            .await;
        id_of(&vehicle)
    }

    pub async fn seed_part(&self, part_number: &str, quantity: i32, price: &str) -> String {
        let part = self
            .create(
                "/api/v1/inventory",
                json!({
                    "partNumber": part_number,
                    "name": format!("Part {part_number}"),
                    "quantity": quantity,
                    "minQuantity": 2,
                    "costPrice": "5.00",
                    "sellingPrice": price
                }),
            )
            .await;
        id_of(&part)
    }

    /// A customer with one vehicle.
    pub async fn seed_owner(&self, email: &str, vin: &str) -> (String, String) {
        let customer_id = self.seed_customer(email).await;
        let vehicle_id = self.seed_vehicle(&customer_id, vin).await;
        (customer_id, vehicle_id)
    }

    pub async fn seed_work_order(
        &self,
        customer_id: &str,
        vehicle_id: &str,
        line_items: Value,
    ) -> Value {
        self.create(
            "/api/v1/work-orders",
            json!({
                "description": "Brake service",
                "startDate": "2026-03-01T09:00:00Z",
                "customerId": customer_id,
                "vehicleId": vehicle_id,
                "lineItems": line_items
            }),
        )
        .await
    }

    pub async fn part_quantity(&self, part_id: &str) -> i64 {
        let (status, part) = self.get(&format!("/api/v1/inventory/{part_id}")).await;
        assert_eq!(status, StatusCode::OK, "{part}");
        part["quantity"].as_i64().expect("quantity")
    }

    /// Number of ledger rows on the part's detail view.
    pub async fn ledger_len(&self, part_id: &str) -> usize {
        let (status, part) = self.get(&format!("/api/v1/inventory/{part_id}")).await;
        assert_eq!(status, StatusCode::OK, "{part}");
        part["transactions"].as_array().expect("transactions").len()
    }

    /// Invoices a completed work order, asserting a 201.
    pub async fn invoice(&self, work_order_id: &str) -> Value {
        self.create(
            &format!("/api/v1/work-orders/{work_order_id}/invoice"),
            json!({}),
        )
        .await
    }

    /// Settles the invoice's outstanding balance in one cash payment.
    pub async fn pay_in_full(&self, invoice: &Value) {
        self.create(
            &format!("/api/v1/invoices/{}/payments", id_of(invoice)),
            json!({ "amount": invoice["total"], "method": "CASH" }),
        )
        .await;
    }

    /// Writes a status straight to the row, skipping transition rules.
    pub async fn force_work_order_status(&self, work_order_id: &str, status: WorkOrderStatus) {
        let id = uuid::Uuid::parse_str(work_order_id).expect("uuid");
        let row = work_order::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("query")
            .expect("work order row");
        let mut active: work_order::ActiveModel = row.into();
        active.status = Set(status);
        active.update(&*self.state.db).await.expect("update status");
    }

    /// Moves a work order to COMPLETED.
    pub async fn complete(&self, work_order_id: &str) {
        let (status, body) = self
            .put(
                &format!("/api/v1/work-orders/{work_order_id}"),
                json!({ "status": "COMPLETED" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("id").to_string()
}

/// Money fields are serialized as decimal strings.
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        other => panic!("expected a decimal string, got {other}"),
    }
}
