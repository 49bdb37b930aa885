use crate::errors::ServiceError;
use crate::handlers::common::{
    created_response, deleted_response, success_response, ApiJson, ApiPath, ApiQuery,
};
use crate::services::vehicles::{
    VehicleDetail, VehicleFilters, VehicleInput, VehicleService, VehicleSummary,
};
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use uuid::Uuid;

pub trait VehiclesHandlerState: Clone + Send + Sync + 'static {
    fn vehicle_service(&self) -> &VehicleService;
}

pub fn vehicles_router<S>() -> Router<S>
where
    S: VehiclesHandlerState,
{
    Router::new()
        .route("/", get(list_vehicles::<S>).post(create_vehicle::<S>))
        .route(
            "/:id",
            get(get_vehicle::<S>)
                .put(update_vehicle::<S>)
                .delete(delete_vehicle::<S>),
        )
}

#[utoipa::path(
    get,
    path = "/api/v1/vehicles",
    params(VehicleFilters),
    responses(
        (status = 200, description = "Vehicles, most recently updated first", body = [VehicleSummary]),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn list_vehicles<S>(
    State(state): State<S>,
    ApiQuery(filters): ApiQuery<VehicleFilters>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: VehiclesHandlerState,
{
    let vehicles = state.vehicle_service().list_vehicles(filters).await?;
    Ok(success_response(vehicles))
}

#[utoipa::path(
    get,
    path = "/api/v1/vehicles/{id}",
    params(("id" = Uuid, Path, description = "Vehicle ID")),
    responses(
        (status = 200, description = "Vehicle with owner, work orders and appointments", body = VehicleDetail),
        (status = 404, description = "Vehicle not found", body = crate::errors::ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn get_vehicle<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: VehiclesHandlerState,
{
    let vehicle = state.vehicle_service().get_vehicle(id).await?;
    Ok(success_response(vehicle))
}

#[utoipa::path(
    post,
    path = "/api/v1/vehicles",
    request_body = VehicleInput,
    responses(
        (status = 201, description = "Vehicle created", body = crate::entities::vehicle::Model),
        (status = 400, description = "Missing field or VIN in use", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn create_vehicle<S>(
    State(state): State<S>,
    ApiJson(input): ApiJson<VehicleInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: VehiclesHandlerState,
{
    let vehicle = state.vehicle_service().create_vehicle(input).await?;
    Ok(created_response(vehicle))
}

#[utoipa::path(
    put,
    path = "/api/v1/vehicles/{id}",
    params(("id" = Uuid, Path, description = "Vehicle ID")),
    request_body = VehicleInput,
    responses(
        (status = 200, description = "Vehicle updated", body = crate::entities::vehicle::Model),
        (status = 400, description = "VIN in use", body = crate::errors::ErrorResponse),
        (status = 404, description = "Vehicle not found", body = crate::errors::ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn update_vehicle<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<VehicleInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: VehiclesHandlerState,
{
    let vehicle = state.vehicle_service().update_vehicle(id, input).await?;
    Ok(success_response(vehicle))
}

#[utoipa::path(
    delete,
    path = "/api/v1/vehicles/{id}",
    params(("id" = Uuid, Path, description = "Vehicle ID")),
    responses(
        (status = 200, description = "Vehicle deleted", body = crate::handlers::common::SuccessResponse),
        (status = 400, description = "Vehicle has active work orders", body = crate::errors::ErrorResponse),
        (status = 404, description = "Vehicle not found", body = crate::errors::ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn delete_vehicle<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: VehiclesHandlerState,
{
    state.vehicle_service().delete_vehicle(id).await?;
    Ok(deleted_response())
}
