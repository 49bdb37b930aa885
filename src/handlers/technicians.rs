use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response, ApiJson, ApiPath, ApiQuery};
use crate::services::technicians::{
    TechnicianFilters, TechnicianInput, TechnicianService, TechnicianSummary,
};
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use uuid::Uuid;

pub trait TechniciansHandlerState: Clone + Send + Sync + 'static {
    fn technician_service(&self) -> &TechnicianService;
}

pub fn technicians_router<S>() -> Router<S>
where
    S: TechniciansHandlerState,
{
    Router::new()
        .route("/", get(list_technicians::<S>).post(create_technician::<S>))
        .route("/:id", get(get_technician::<S>).put(update_technician::<S>))
}

#[utoipa::path(
    get,
    path = "/api/v1/technicians",
    params(TechnicianFilters),
    responses(
        (status = 200, description = "Technicians by name", body = [TechnicianSummary])
    ),
    tag = "technicians"
)]
pub async fn list_technicians<S>(
    State(state): State<S>,
    ApiQuery(filters): ApiQuery<TechnicianFilters>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: TechniciansHandlerState,
{
    let technicians = state.technician_service().list_technicians(filters).await?;
    Ok(success_response(technicians))
}

#[utoipa::path(
    get,
    path = "/api/v1/technicians/{id}",
    params(("id" = Uuid, Path, description = "Technician ID")),
    responses(
        (status = 200, description = "Technician found", body = crate::entities::technician::Model),
        (status = 404, description = "Technician not found", body = crate::errors::ErrorResponse)
    ),
    tag = "technicians"
)]
pub async fn get_technician<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: TechniciansHandlerState,
{
    let technician = state.technician_service().get_technician(id).await?;
    Ok(success_response(technician))
}

#[utoipa::path(
    post,
    path = "/api/v1/technicians",
    request_body = TechnicianInput,
    responses(
        (status = 201, description = "Technician created", body = crate::entities::technician::Model),
        (status = 400, description = "Missing field or email in use", body = crate::errors::ErrorResponse)
    ),
    tag = "technicians"
)]
pub async fn create_technician<S>(
    State(state): State<S>,
    ApiJson(input): ApiJson<TechnicianInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: TechniciansHandlerState,
{
    let technician = state.technician_service().create_technician(input).await?;
    Ok(created_response(technician))
}

#[utoipa::path(
    put,
    path = "/api/v1/technicians/{id}",
    params(("id" = Uuid, Path, description = "Technician ID")),
    request_body = TechnicianInput,
    responses(
        (status = 200, description = "Technician updated", body = crate::entities::technician::Model),
        (status = 404, description = "Technician not found", body = crate::errors::ErrorResponse)
    ),
    tag = "technicians"
)]
pub async fn update_technician<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<TechnicianInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: TechniciansHandlerState,
{
    let technician = state
        .technician_service()
        .update_technician(id, input)
        .await?;
    Ok(success_response(technician))
}
