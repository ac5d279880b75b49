use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Application error taxonomy. Every fallible path in the services and
/// controllers resolves to one of these; the HTTP mapping lives in
/// `IntoResponse` below so handlers never build status codes by hand.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Authentication credentials were not provided.")]
    Unauthorized,

    #[error("{0}")]
    Permission(String),

    #[error("{resource} with id {id} not found")]
    NotFound { resource: &'static str, id: i64 },

    #[error("This seat is already taken.")]
    SeatTaken { row: i32, seat: i32 },

    #[error("Can't delete reservation less than {cutoff_hours} hours before session {session_id}.")]
    TooLateToCancel { session_id: i64, cutoff_hours: i64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Permission(_) => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::SeatTaken { .. } => StatusCode::CONFLICT,
            Self::TooLateToCancel { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        match &self {
            AppError::Validation(_) | AppError::NotFound { .. } => {
                tracing::debug!(%message, "client error");
            }
            AppError::Unauthorized | AppError::Permission(_) => {
                tracing::info!(%message, "access denied");
            }
            AppError::SeatTaken { row, seat } => {
                tracing::info!(row, seat, "seat conflict");
            }
            AppError::TooLateToCancel { session_id, .. } => {
                tracing::info!(session_id, "cancellation past cutoff");
            }
            AppError::Database(_) => {
                tracing::error!(%message, error = ?self, "server error");
            }
        }

        let body = Json(json!({
            "error": {
                "status": status.as_u16(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
