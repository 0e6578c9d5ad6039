use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use notememo_core::sync::RemoteError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Sync is disabled on this server")]
    SyncDisabled,
    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<notememo_core::Error> for AppError {
    fn from(error: notememo_core::Error) -> Self {
        match error {
            notememo_core::Error::InvalidInput(message) => Self::BadRequest(message),
            notememo_core::Error::Serialization(error) => Self::BadRequest(error.to_string()),
            other => {
                tracing::error!("Store failure: {other}");
                Self::internal("storage failure")
            }
        }
    }
}

impl From<RemoteError> for AppError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Malformed(message) | RemoteError::Api(message) => {
                Self::BadRequest(message)
            }
            RemoteError::Unauthorized(message) => Self::Unauthorized(message),
            other => {
                tracing::error!("Store failure: {other}");
                Self::internal("storage failure")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) | Self::SyncDisabled => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
