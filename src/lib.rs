//! Garage API Library
//!
//! Customers, vehicles, technicians, appointments, work orders, parts
//! inventory, invoices and payments for an auto-repair shop, served over a
//! JSON REST API.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{routing::get, Router};
use std::sync::Arc;

use handlers::{
    appointments::AppointmentsHandlerState, customers::CustomersHandlerState,
    dashboard::DashboardHandlerState, inventory::InventoryHandlerState,
    invoices::InvoicesHandlerState, technicians::TechniciansHandlerState,
    vehicles::VehiclesHandlerState, work_orders::WorkOrdersHandlerState,
};
use services::{
    appointments::AppointmentService, customers::CustomerService, dashboard::DashboardService,
    inventory::InventoryService, invoices::InvoiceService, technicians::TechnicianService,
    vehicles::VehicleService, work_orders::WorkOrderService,
};

/// Services layer shared by the HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub customers: Arc<CustomerService>,
    pub vehicles: Arc<VehicleService>,
    pub technicians: Arc<TechnicianService>,
    pub appointments: Arc<AppointmentService>,
    pub work_orders: Arc<WorkOrderService>,
    pub inventory: Arc<InventoryService>,
    pub invoices: Arc<InvoiceService>,
    pub dashboard: Arc<DashboardService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<db::DbPool>,
        event_sender: Arc<events::EventSender>,
        cfg: &config::AppConfig,
    ) -> Self {
        Self {
            customers: Arc::new(CustomerService::new(db_pool.clone(), event_sender.clone())),
            vehicles: Arc::new(VehicleService::new(db_pool.clone(), event_sender.clone())),
            technicians: Arc::new(TechnicianService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            appointments: Arc::new(AppointmentService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            work_orders: Arc::new(WorkOrderService::new(
                db_pool.clone(),
                event_sender.clone(),
                cfg.tax_rate,
                cfg.inventory_allow_negative_stock,
            )),
            inventory: Arc::new(InventoryService::new(
                db_pool.clone(),
                event_sender.clone(),
                cfg.inventory_allow_negative_stock,
            )),
            dashboard: Arc::new(DashboardService::new(db_pool.clone())),
            invoices: Arc::new(InvoiceService::new(
                db_pool,
                event_sender,
                cfg.tax_rate,
                cfg.invoice_payment_terms_days,
            )),
        }
    }
}

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<db::DbPool>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let event_sender = Arc::new(event_sender);
        let services = AppServices::new(db.clone(), event_sender.clone(), &config);
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

impl CustomersHandlerState for AppState {
    fn customer_service(&self) -> &CustomerService {
        &self.services.customers
    }
}

impl VehiclesHandlerState for AppState {
    fn vehicle_service(&self) -> &VehicleService {
        &self.services.vehicles
    }
}

impl TechniciansHandlerState for AppState {
    fn technician_service(&self) -> &TechnicianService {
        &self.services.technicians
    }
}

impl AppointmentsHandlerState for AppState {
    fn appointment_service(&self) -> &AppointmentService {
        &self.services.appointments
    }
}

impl WorkOrdersHandlerState for AppState {
    fn work_order_service(&self) -> &WorkOrderService {
        &self.services.work_orders
    }

    fn invoice_service(&self) -> &InvoiceService {
        &self.services.invoices
    }
}

impl InventoryHandlerState for AppState {
    fn inventory_service(&self) -> &InventoryService {
        &self.services.inventory
    }
}

impl InvoicesHandlerState for AppState {
    fn invoice_service(&self) -> &InvoiceService {
        &self.services.invoices
    }
}

impl DashboardHandlerState for AppState {
    fn dashboard_service(&self) -> &DashboardService {
        &self.services.dashboard
    }
}

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/customers", handlers::customers::customers_router())
        .nest("/vehicles", handlers::vehicles::vehicles_router())
        .nest("/technicians", handlers::technicians::technicians_router())
        .nest("/appointments", handlers::appointments::appointments_router())
        .nest("/work-orders", handlers::work_orders::work_orders_router())
        .nest("/inventory", handlers::inventory::inventory_router())
        .nest("/invoices", handlers::invoices::invoices_router())
        .nest("/dashboard", handlers::dashboard::dashboard_router())
}

/// The full application router: API, health, docs and the request-id and
/// tracing layers. CORS is left to the binary since it depends on the
/// deployment.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "garage-api up" }))
        .nest("/api/v1", api_v1_routes())
        .merge(health::health_routes(state.db.clone()))
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
