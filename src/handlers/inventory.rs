use crate::errors::ServiceError;
use crate::handlers::common::{
    created_response, deleted_response, success_response, ApiJson, ApiPath, ApiQuery,
};
use crate::services::inventory::{
    AdjustStockInput, CreateInventoryItemInput, InventoryFilters, InventoryItemDetail,
    InventoryItemSummary, InventoryService, UpdateInventoryItemInput,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

// Trait for inventory handler state that provides access to inventory service
pub trait InventoryHandlerState: Clone + Send + Sync + 'static {
    fn inventory_service(&self) -> &InventoryService;
}

pub fn inventory_router<S>() -> Router<S>
where
    S: InventoryHandlerState,
{
    Router::new()
        .route("/", get(list_inventory::<S>).post(create_inventory::<S>))
        .route(
            "/:id",
            get(get_inventory::<S>)
                .put(update_inventory::<S>)
                .delete(delete_inventory::<S>),
        )
        .route("/:id/adjust", post(adjust_inventory::<S>))
}

/// List parts with optional search, category and low-stock filters
#[utoipa::path(
    get,
    path = "/api/v1/inventory",
    params(InventoryFilters),
    responses(
        (status = 200, description = "Inventory list returned", body = [InventoryItemSummary]),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn list_inventory<S>(
    State(state): State<S>,
    ApiQuery(filters): ApiQuery<InventoryFilters>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let items = state.inventory_service().list_items(filters).await?;
    Ok(success_response(items))
}

/// Get a part with its most recent transactions
#[utoipa::path(
    get,
    path = "/api/v1/inventory/{id}",
    params(("id" = Uuid, Path, description = "Inventory item ID")),
    responses(
        (status = 200, description = "Inventory item returned", body = InventoryItemDetail),
        (status = 404, description = "Inventory item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn get_inventory<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let item = state.inventory_service().get_item(id).await?;
    Ok(success_response(item))
}

/// Create a part; any opening quantity is recorded as a purchase
#[utoipa::path(
    post,
    path = "/api/v1/inventory",
    request_body = CreateInventoryItemInput,
    responses(
        (status = 201, description = "Inventory item created", body = crate::entities::inventory_item::Model),
        (status = 400, description = "Missing field or part number in use", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn create_inventory<S>(
    State(state): State<S>,
    ApiJson(input): ApiJson<CreateInventoryItemInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let item = state.inventory_service().create_item(input).await?;
    Ok(created_response(item))
}

#[utoipa::path(
    put,
    path = "/api/v1/inventory/{id}",
    params(("id" = Uuid, Path, description = "Inventory item ID")),
    request_body = UpdateInventoryItemInput,
    responses(
        (status = 200, description = "Inventory item updated", body = crate::entities::inventory_item::Model),
        (status = 400, description = "Part number in use", body = crate::errors::ErrorResponse),
        (status = 404, description = "Inventory item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn update_inventory<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<UpdateInventoryItemInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let item = state.inventory_service().update_item(id, input).await?;
    Ok(success_response(item))
}

/// Record a purchase, return, adjustment or write-off against a part
#[utoipa::path(
    post,
    path = "/api/v1/inventory/{id}/adjust",
    params(("id" = Uuid, Path, description = "Inventory item ID")),
    request_body = AdjustStockInput,
    responses(
        (status = 200, description = "Stock adjusted", body = InventoryItemDetail),
        (status = 400, description = "Invalid quantity or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Inventory item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn adjust_inventory<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<AdjustStockInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let item = state.inventory_service().adjust_stock(id, input).await?;
    Ok(success_response(item))
}

#[utoipa::path(
    delete,
    path = "/api/v1/inventory/{id}",
    params(("id" = Uuid, Path, description = "Inventory item ID")),
    responses(
        (status = 200, description = "Inventory item deleted", body = crate::handlers::common::SuccessResponse),
        (status = 400, description = "Part is used on work orders", body = crate::errors::ErrorResponse),
        (status = 404, description = "Inventory item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn delete_inventory<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    state.inventory_service().delete_item(id).await?;
    Ok(deleted_response())
}
