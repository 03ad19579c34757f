use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use gazette_core::CoreError;

#[derive(Debug)]
pub enum AppError {
    Core(CoreError),
    Anyhow(anyhow::Error),
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Core(CoreError::NotFound(msg)) => (StatusCode::NOT_FOUND, msg),
            AppError::Core(CoreError::InvalidInput(msg)) => (StatusCode::BAD_REQUEST, msg),
            AppError::Core(CoreError::Conflict(msg)) => (StatusCode::CONFLICT, msg),
            AppError::Core(CoreError::Forbidden(msg)) => (StatusCode::FORBIDDEN, msg),
            AppError::Core(CoreError::Internal(msg)) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
