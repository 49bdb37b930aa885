use crate::errors::ServiceError;
use crate::handlers::common::{
    created_response, deleted_response, success_response, ApiJson, ApiPath, ApiQuery,
};
use crate::services::appointments::{
    AppointmentFilters, AppointmentInput, AppointmentService, AppointmentSummary,
};
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use uuid::Uuid;

pub trait AppointmentsHandlerState: Clone + Send + Sync + 'static {
    fn appointment_service(&self) -> &AppointmentService;
}

pub fn appointments_router<S>() -> Router<S>
where
    S: AppointmentsHandlerState,
{
    Router::new()
        .route("/", get(list_appointments::<S>).post(create_appointment::<S>))
        .route(
            "/:id",
            get(get_appointment::<S>)
                .put(update_appointment::<S>)
                .delete(delete_appointment::<S>),
        )
}

#[utoipa::path(
    get,
    path = "/api/v1/appointments",
    params(AppointmentFilters),
    responses(
        (status = 200, description = "Appointments by start time", body = [AppointmentSummary])
    ),
    tag = "appointments"
)]
pub async fn list_appointments<S>(
    State(state): State<S>,
    ApiQuery(filters): ApiQuery<AppointmentFilters>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: AppointmentsHandlerState,
{
    let appointments = state.appointment_service().list_appointments(filters).await?;
    Ok(success_response(appointments))
}

#[utoipa::path(
    get,
    path = "/api/v1/appointments/{id}",
    params(("id" = Uuid, Path, description = "Appointment ID")),
    responses(
        (status = 200, description = "Appointment found", body = AppointmentSummary),
        (status = 404, description = "Appointment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "appointments"
)]
pub async fn get_appointment<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: AppointmentsHandlerState,
{
    let appointment = state.appointment_service().get_appointment(id).await?;
    Ok(success_response(appointment))
}

#[utoipa::path(
    post,
    path = "/api/v1/appointments",
    request_body = AppointmentInput,
    responses(
        (status = 201, description = "Appointment scheduled", body = AppointmentSummary),
        (status = 400, description = "Missing field or endTime not after startTime", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer or vehicle not found", body = crate::errors::ErrorResponse)
    ),
    tag = "appointments"
)]
pub async fn create_appointment<S>(
    State(state): State<S>,
    ApiJson(input): ApiJson<AppointmentInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: AppointmentsHandlerState,
{
    let appointment = state.appointment_service().create_appointment(input).await?;
    Ok(created_response(appointment))
}

#[utoipa::path(
    put,
    path = "/api/v1/appointments/{id}",
    params(("id" = Uuid, Path, description = "Appointment ID")),
    request_body = AppointmentInput,
    responses(
        (status = 200, description = "Appointment updated", body = AppointmentSummary),
        (status = 404, description = "Appointment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "appointments"
)]
pub async fn update_appointment<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<AppointmentInput>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: AppointmentsHandlerState,
{
    let appointment = state
        .appointment_service()
        .update_appointment(id, input)
        .await?;
    Ok(success_response(appointment))
}

#[utoipa::path(
    delete,
    path = "/api/v1/appointments/{id}",
    params(("id" = Uuid, Path, description = "Appointment ID")),
    responses(
        (status = 200, description = "Appointment deleted", body = crate::handlers::common::SuccessResponse),
        (status = 404, description = "Appointment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "appointments"
)]
pub async fn delete_appointment<S>(
    State(state): State<S>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: AppointmentsHandlerState,
{
    state.appointment_service().delete_appointment(id).await?;
    Ok(deleted_response())
}
