use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Garage API",
        version = "1.0.0",
        description = r#"
# Garage Management API

Back office for an auto-repair shop.

## Features

- **Customers & Vehicles**: owners and the vehicles they bring in
- **Work Orders**: repair jobs with priced line items; parts on a line are taken from stock
- **Inventory**: parts catalogue with an append-only transaction ledger
- **Invoices & Payments**: invoice completed work and record payments against it
- **Technicians & Appointments**: who does the work and when the car is booked in

## Error Handling

Errors are returned as JSON with an appropriate HTTP status code:

```json
{
  "error": "Cannot delete customer with active work orders or unpaid invoices",
  "hasActiveWorkOrders": true,
  "hasUnpaidInvoices": false
}
```

Money values are serialized as decimal strings.
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
        (name = "customers", description = "Customer management endpoints"),
        (name = "vehicles", description = "Vehicle management endpoints"),
        (name = "technicians", description = "Technician endpoints"),
        (name = "appointments", description = "Appointment scheduling endpoints"),
        (name = "work-orders", description = "Work order lifecycle endpoints"),
        (name = "inventory", description = "Parts inventory endpoints"),
        (name = "invoices", description = "Invoice and payment endpoints"),
        (name = "dashboard", description = "Shop overview endpoints"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        // Customers
        crate::handlers::customers::list_customers,
        crate::handlers::customers::get_customer,
        crate::handlers::customers::create_customer,
        crate::handlers::customers::update_customer,
        crate::handlers::customers::delete_customer,

        // Vehicles
        crate::handlers::vehicles::list_vehicles,
        crate::handlers::vehicles::get_vehicle,
        crate::handlers::vehicles::create_vehicle,
        crate::handlers::vehicles::update_vehicle,
        crate::handlers::vehicles::delete_vehicle,

        // Technicians
        crate::handlers::technicians::list_technicians,
        crate::handlers::technicians::get_technician,
        crate::handlers::technicians::create_technician,
        crate::handlers::technicians::update_technician,

        // Appointments
        crate::handlers::appointments::list_appointments,
        crate::handlers::appointments::get_appointment,
        crate::handlers::appointments::create_appointment,
        crate::handlers::appointments::update_appointment,
        crate::handlers::appointments::delete_appointment,

        // Work orders
        crate::handlers::work_orders::list_work_orders,
        crate::handlers::work_orders::get_work_order,
        crate::handlers::work_orders::create_work_order,
        crate::handlers::work_orders::update_work_order,
        crate::handlers::work_orders::delete_work_order,
        crate::handlers::work_orders::generate_invoice,

        // Inventory
        crate::handlers::inventory::list_inventory,
        crate::handlers::inventory::get_inventory,
        crate::handlers::inventory::create_inventory,
        crate::handlers::inventory::update_inventory,
        crate::handlers::inventory::adjust_inventory,
        crate::handlers::inventory::delete_inventory,

        // Invoices
        crate::handlers::invoices::list_invoices,
        crate::handlers::invoices::get_invoice,
        crate::handlers::invoices::update_invoice,
        crate::handlers::invoices::record_payment,
        crate::handlers::invoices::void_invoice,

        // Dashboard
        crate::handlers::dashboard::get_dashboard,

        // Health
        crate::health::health_check,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::handlers::common::SuccessResponse,
            crate::entities::WorkOrderStatus,
            crate::entities::InvoiceStatus,
            crate::entities::PaymentMethod,
            crate::entities::AppointmentStatus,
            crate::entities::TransactionType,
            crate::services::pricing::Totals,
            crate::services::dashboard::DashboardSummary,
            crate::services::dashboard::DashboardCounts,
            crate::services::dashboard::MonthlySales,
            crate::health::HealthInfo,
            crate::health::HealthStatus,
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_resource() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Garage API"));
        for path in [
            "/api/v1/customers/{id}",
            "/api/v1/vehicles",
            "/api/v1/work-orders/{id}/invoice",
            "/api/v1/inventory/{id}/adjust",
            "/api/v1/invoices/{id}/payments",
            "/api/v1/appointments",
            "/api/v1/technicians/{id}",
            "/api/v1/dashboard",
        ] {
            assert!(json.contains(path), "missing {path}");
        }
    }
}
