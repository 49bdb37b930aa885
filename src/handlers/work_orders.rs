use crate::errors::ServiceError;
use crate::handlers::common::{
    created_response, deleted_response, success_response, ApiJson, ApiPath, ApiQuery,
};
use crate::services::{
    invoices::{GenerateInvoiceInput, InvoiceService},
    work_orders::{
        CreateWorkOrderInput, UpdateWorkOrderInput, WorkOrderDetail, WorkOrderFilters,
        WorkOrderService, WorkOrderSummary,
    },
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

// Invoicing hangs off the work order route, so this state also needs the
// invoice service
pub trait WorkOrdersHandlerState: Clone + Send + Sync + 'static {
    fn work_order_service(&self) -> &WorkOrderService;
    fn invoice_service(&self) -> &InvoiceService;
}

/// Create the work orders router
pub fn work_orders_router<S>() -> Router<S>
where
    S: WorkOrdersHandlerState,
{
    Router::new()
        .route("/", get(list_work_orders::<S>).post(create_work_order::<S>))
        .route(
            "/:id",
            get(get_work_order::<S>)
                .put(update_work_order::<S>)
                .delete(delete_work_order::<S>),
        )
        .route("/:id/invoice", post(generate_invoice::<S>))
}

/// List work orders with optional filtering
#[utoipa::path(
    get,
    path = "/api/v1/work-orders",
    params(WorkOrderFilters),
    responses(
        (status = 200, description = "Work orders, newest first", body = [WorkOrderSummary]),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "work-orders"
)]
pub async fn list_work_orders<S>(
    State(state): State<S>,
    ApiQuery(filters): ApiQuery<WorkOrderFilters>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: WorkOrdersHandlerState,
{
    let work_orders = state.work_order_service().list_work_orders(filters).await?;
    Ok(success_response(work_orders))
}

/// Get a work order with its line items and computed totals
#[utoipa::path(
    get,
    path = "/api/v1/work-orders/{id}",
    params(("id" = Uuid, Path, description = "Work order ID")),
    responses(
        (status = 200, description = "Work order found", body = WorkOrderDetail),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "work-orders"
)]
pub async fn get_work_order<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: WorkOrdersHandlerState,
{
    let work_order = state.work_order_service().get_work_order(id).await?;
    Ok(success_response(work_order))
}

/// Create a work order; parts on its line items are taken from stock
#[utoipa::path(
    post,
    path = "/api/v1/work-orders",
    request_body = CreateWorkOrderInput,
    responses(
        (status = 201, description = "Work order created", body = WorkOrderDetail),
        (status = 400, description = "Missing field or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer, vehicle, technician or part not found", body = crate::errors::ErrorResponse)
    ),
    tag = "work-orders"
)]
pub async fn create_work_order<S>(
    State(state): State<S>,
    ApiJson(input): ApiJson<CreateWorkOrderInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: WorkOrdersHandlerState,
{
    let work_order = state.work_order_service().create_work_order(input).await?;
    Ok(created_response(work_order))
}

/// Update a work order that has not been invoiced
#[utoipa::path(
    put,
    path = "/api/v1/work-orders/{id}",
    params(("id" = Uuid, Path, description = "Work order ID")),
    request_body = UpdateWorkOrderInput,
    responses(
        (status = 200, description = "Work order updated", body = WorkOrderDetail),
        (status = 400, description = "Locked work order, invalid transition or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "work-orders"
)]
pub async fn update_work_order<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<UpdateWorkOrderInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: WorkOrdersHandlerState,
{
    let work_order = state
        .work_order_service()
        .update_work_order(id, input)
        .await?;
    Ok(success_response(work_order))
}

/// Delete an uninvoiced work order and return its parts to stock
#[utoipa::path(
    delete,
    path = "/api/v1/work-orders/{id}",
    params(("id" = Uuid, Path, description = "Work order ID")),
    responses(
        (status = 200, description = "Work order deleted", body = crate::handlers::common::SuccessResponse),
        (status = 400, description = "Work order is invoiced or paid", body = crate::errors::ErrorResponse),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "work-orders"
)]
pub async fn delete_work_order<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: WorkOrdersHandlerState,
{
    state.work_order_service().delete_work_order(id).await?;
    Ok(deleted_response())
}

/// Invoice a completed work order
#[utoipa::path(
    post,
    path = "/api/v1/work-orders/{id}/invoice",
    params(("id" = Uuid, Path, description = "Work order ID")),
    request_body(content = GenerateInvoiceInput, description = "Optional notes and due date"),
    responses(
        (status = 201, description = "Invoice generated", body = crate::entities::invoice::Model),
        (status = 400, description = "Work order not completed or already invoiced", body = crate::errors::ErrorResponse),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "work-orders"
)]
pub async fn generate_invoice<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
    input: Option<ApiJson<GenerateInvoiceInput>>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: WorkOrdersHandlerState,
{
    let input = input.map(|ApiJson(input)| input).unwrap_or_default();
    let invoice = state.invoice_service().generate_invoice(id, input).await?;
    Ok(created_response(invoice))
}
