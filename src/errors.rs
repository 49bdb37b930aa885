use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{error::DbErr, SqlErr, TransactionError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "error": "Cannot delete customer with active work orders or unpaid invoices",
    "hasActiveWorkOrders": true,
    "hasUnpaidInvoices": false,
    "requestId": "6f1c2d4e-7a51-4bb1-9c1e-3f2d5e8a9b10"
}))]
pub struct ErrorResponse {
    /// Human-readable error description
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_active_work_orders: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_unpaid_invoices: Option<bool>,
    /// Request identifier echoed from `x-request-id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Which delete guards tripped. `None` means the guard does not apply to
/// the resource being deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteGuards {
    pub has_active_work_orders: Option<bool>,
    pub has_unpaid_invoices: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    InvalidOperation(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    DeleteBlocked {
        message: String,
        guards: DeleteGuards,
    },

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = err.field_errors().into_iter().collect();
        fields.sort_by_key(|(field, _)| *field);
        let message = fields
            .first()
            .and_then(|(field, errors)| {
                errors.first().map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .unwrap_or_else(|| err.to_string());
        ServiceError::ValidationError(message)
    }
}

impl From<crate::services::pricing::AmountOverflow> for ServiceError {
    fn from(err: crate::services::pricing::AmountOverflow) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<TransactionError<ServiceError>> for ServiceError {
    fn from(err: TransactionError<ServiceError>) -> Self {
        match err {
            TransactionError::Connection(e) => ServiceError::DatabaseError(e),
            TransactionError::Transaction(e) => e,
        }
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ServiceError {
    fn from(rejection: PathRejection) -> Self {
        ServiceError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ServiceError {
    fn from(rejection: QueryRejection) -> Self {
        ServiceError::BadRequest(rejection.body_text())
    }
}

impl ServiceError {
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    /// Maps a unique-index violation to a validation error carrying
    /// `message`; any other database error is passed through.
    pub fn unique_violation_or_db(error: DbErr, message: &str) -> Self {
        match error.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                ServiceError::ValidationError(message.to_string())
            }
            _ => ServiceError::DatabaseError(error),
        }
    }

    pub fn not_found(entity: &str) -> Self {
        ServiceError::NotFound(format!("{} not found", entity))
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidOperation(_)
            | Self::BadRequest(_)
            | Self::DeleteBlocked { .. } => StatusCode::BAD_REQUEST,
            Self::DatabaseError(_) | Self::EventError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let guards = match &self {
            ServiceError::DeleteBlocked { guards, .. } => *guards,
            _ => DeleteGuards::default(),
        };

        let body = ErrorResponse {
            error: self.response_message(),
            has_active_work_orders: guards.has_active_work_orders,
            has_unpaid_invoices: guards.has_unpaid_invoices,
            request_id: current_request_id(),
        };

        (status, Json(body)).into_response()
    }
}
