use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error as ThisError;

use super::{ControllerError, StoreError};

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, ThisError)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Controller(#[from] ControllerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ApiErrorObject {
                    code: "BAD_REQUEST".to_string(),
                    message,
                },
            ),
            ApiError::Store(err @ StoreError::NotFound { .. }) => (
                StatusCode::NOT_FOUND,
                ApiErrorObject {
                    code: "NOT_FOUND".to_string(),
                    message: err.to_string(),
                },
            ),
            ApiError::Store(err @ StoreError::AlreadyExists { .. }) => (
                StatusCode::CONFLICT,
                ApiErrorObject {
                    code: "CONFLICT".to_string(),
                    message: err.to_string(),
                },
            ),
            ApiError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                },
            ),
            ApiError::Controller(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorObject {
                    code: "CONTROLLER_UNAVAILABLE".to_string(),
                    message: "The reconciliation controller is not running.".to_string(),
                },
            ),
        };
        (status, Json(ApiErrorBody { inner: body })).into_response()
    }
}

/// Standardized API error response payload.
#[derive(Serialize)]
pub struct ApiErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    #[serde(rename = "error")]
    pub inner: ApiErrorObject,
}
