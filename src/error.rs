use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by the HTTP layer.
///
/// The list engine itself never fails; everything here comes from the
/// validation boundary, id lookups, or the storage collaborator.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("inventory item {0} not found")]
    NotFound(i32),
    #[error("validation failed")]
    Validation(validator::ValidationErrors),
    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Storage(err)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        ErrorBody {
            error: error.into(),
            details: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                Json(ErrorBody::new(format!("inventory item {id} not found"))),
            )
                .into_response(),
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: "validation failed".to_string(),
                    details: serde_json::to_value(&errors).ok(),
                }),
            )
                .into_response(),
            ApiError::Storage(err) => {
                error!(error = ?err, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody::new("internal server error")),
                )
                    .into_response()
            }
        }
    }
}
