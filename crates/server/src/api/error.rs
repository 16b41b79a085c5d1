//! Mapping from manager errors to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use swarmcast_core::{InfoHash, ManagerError};
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Outcome of a mutation that may be refused in read-only mode.
#[derive(Debug, Serialize)]
pub struct OutcomeResponse {
    pub outcome: &'static str,
}

impl OutcomeResponse {
    pub fn new(outcome: &'static str) -> Json<Self> {
        Json(Self { outcome })
    }
}

/// Error returned by API handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ManagerError> for ApiError {
    fn from(e: ManagerError) -> Self {
        let status = match &e {
            ManagerError::NotFound(_) => StatusCode::NOT_FOUND,
            ManagerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ManagerError::MetadataPending(_) => StatusCode::CONFLICT,
            ManagerError::ResourceExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => {
                error!("Request failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Parse an info hash from a path segment.
pub fn parse_hash(hash: &str) -> Result<InfoHash, ApiError> {
    InfoHash::parse(hash).map_err(|e| ApiError::bad_request(format!("Invalid hash: {}", e)))
}
