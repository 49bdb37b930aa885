use crate::errors::ServiceError;
use crate::handlers::common::success_response;
use crate::services::dashboard::{DashboardService, DashboardSummary};
use axum::{extract::State, response::IntoResponse, routing::get, Router};

pub trait DashboardHandlerState: Clone + Send + Sync + 'static {
    fn dashboard_service(&self) -> &DashboardService;
}

pub fn dashboard_router<S>() -> Router<S>
where
    S: DashboardHandlerState,
{
    Router::new().route("/", get(get_dashboard::<S>))
}

/// Shop overview for the landing page
#[utoipa::path(
    get,
    path = "/api/v1/dashboard",
    responses(
        (status = 200, description = "Dashboard summary", body = DashboardSummary),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "dashboard"
)]
pub async fn get_dashboard<S>(State(state): State<S>) -> Result<impl IntoResponse, ServiceError>
where
    S: DashboardHandlerState,
{
    let summary = state.dashboard_service().summary().await?;
    Ok(success_response(summary))
}
