use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response, ApiJson, ApiPath, ApiQuery};
use crate::services::invoices::{
    InvoiceDetail, InvoiceFilters, InvoiceService, InvoiceSummary, PaymentInput,
    UpdateInvoiceInput,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

pub trait InvoicesHandlerState: Clone + Send + Sync + 'static {
    fn invoice_service(&self) -> &InvoiceService;
}

pub fn invoices_router<S>() -> Router<S>
where
    S: InvoicesHandlerState,
{
    Router::new()
        .route("/", get(list_invoices::<S>))
        .route("/:id", get(get_invoice::<S>).put(update_invoice::<S>))
        .route("/:id/payments", post(record_payment::<S>))
        .route("/:id/void", post(void_invoice::<S>))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices",
    params(InvoiceFilters),
    responses(
        (status = 200, description = "Invoices, newest first", body = [InvoiceSummary])
    ),
    tag = "invoices"
)]
pub async fn list_invoices<S>(
    State(state): State<S>,
    ApiQuery(filters): ApiQuery<InvoiceFilters>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InvoicesHandlerState,
{
    let invoices = state.invoice_service().list_invoices(filters).await?;
    Ok(success_response(invoices))
}

/// Get an invoice with payments, balance and a totals integrity flag
#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice found", body = InvoiceDetail),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn get_invoice<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InvoicesHandlerState,
{
    let invoice = state.invoice_service().get_invoice(id).await?;
    Ok(success_response(invoice))
}

#[utoipa::path(
    put,
    path = "/api/v1/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = UpdateInvoiceInput,
    responses(
        (status = 200, description = "Invoice updated", body = crate::entities::invoice::Model),
        (status = 400, description = "Invoice is settled or status not allowed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn update_invoice<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<UpdateInvoiceInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InvoicesHandlerState,
{
    let invoice = state.invoice_service().update_invoice(id, input).await?;
    Ok(success_response(invoice))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/payments",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = PaymentInput,
    responses(
        (status = 201, description = "Payment recorded", body = crate::entities::payment::Model),
        (status = 400, description = "Invalid amount, overpayment or settled invoice", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn record_payment<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<PaymentInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InvoicesHandlerState,
{
    let payment = state.invoice_service().record_payment(id, input).await?;
    Ok(created_response(payment))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/void",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice voided", body = crate::entities::invoice::Model),
        (status = 400, description = "Invoice has payments or is already void", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn void_invoice<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InvoicesHandlerState,
{
    let invoice = state.invoice_service().void_invoice(id).await?;
    Ok(success_response(invoice))
}
