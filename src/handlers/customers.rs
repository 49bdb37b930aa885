use crate::errors::ServiceError;
use crate::handlers::common::{
    created_response, deleted_response, success_response, ApiJson, ApiPath, ApiQuery,
};
use crate::services::customers::{
    CustomerDetail, CustomerFilters, CustomerInput, CustomerService, CustomerSummary,
};
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use uuid::Uuid;

/// State that exposes the customer service to these handlers
pub trait CustomersHandlerState: Clone + Send + Sync + 'static {
    fn customer_service(&self) -> &CustomerService;
}

pub fn customers_router<S>() -> Router<S>
where
    S: CustomersHandlerState,
{
    Router::new()
        .route("/", get(list_customers::<S>).post(create_customer::<S>))
        .route(
            "/:id",
            get(get_customer::<S>)
                .put(update_customer::<S>)
                .delete(delete_customer::<S>),
        )
}

/// List customers with vehicle and work order counts
#[utoipa::path(
    get,
    path = "/api/v1/customers",
    params(CustomerFilters),
    responses(
        (status = 200, description = "Customers ordered by last name", body = [CustomerSummary]),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "customers"
)]
pub async fn list_customers<S>(
    State(state): State<S>,
    ApiQuery(filters): ApiQuery<CustomerFilters>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: CustomersHandlerState,
{
    let customers = state.customer_service().list_customers(filters).await?;
    Ok(success_response(customers))
}

/// Get a customer with vehicles, work orders, appointments and invoices
#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Customer found", body = CustomerDetail),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse)
    ),
    tag = "customers"
)]
pub async fn get_customer<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: CustomersHandlerState,
{
    let customer = state.customer_service().get_customer(id).await?;
    Ok(success_response(customer))
}

#[utoipa::path(
    post,
    path = "/api/v1/customers",
    request_body = CustomerInput,
    responses(
        (status = 201, description = "Customer created", body = crate::entities::customer::Model),
        (status = 400, description = "Missing field, invalid email or email in use", body = crate::errors::ErrorResponse)
    ),
    tag = "customers"
)]
pub async fn create_customer<S>(
    State(state): State<S>,
    ApiJson(input): ApiJson<CustomerInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: CustomersHandlerState,
{
    let customer = state.customer_service().create_customer(input).await?;
    Ok(created_response(customer))
}

#[utoipa::path(
    put,
    path = "/api/v1/customers/{id}",
    params(("id" = Uuid, Path, description = "Customer ID")),
    request_body = CustomerInput,
    responses(
        (status = 200, description = "Customer updated", body = crate::entities::customer::Model),
        (status = 400, description = "Invalid email or email in use", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse)
    ),
    tag = "customers"
)]
pub async fn update_customer<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<CustomerInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: CustomersHandlerState,
{
    let customer = state.customer_service().update_customer(id, input).await?;
    Ok(success_response(customer))
}

/// Delete a customer and everything it owns
#[utoipa::path(
    delete,
    path = "/api/v1/customers/{id}",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Customer deleted", body = crate::handlers::common::SuccessResponse),
        (status = 400, description = "Active work orders or unpaid invoices", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse)
    ),
    tag = "customers"
)]
pub async fn delete_customer<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: CustomersHandlerState,
{
    state.customer_service().delete_customer(id).await?;
    Ok(deleted_response())
}
