//! Error types for the HTTP handlers.
//!
//! [`ApiError`] bridges the engine's error taxonomy and HTTP responses,
//! implementing axum's `IntoResponse`. Domain rejections keep their stable
//! codes so clients can branch on `code` rather than parsing messages, and
//! variants carry a structured `details` object where the storefront needs
//! machine-readable context (countdown times, remaining stock, cap).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use flash_sale_core::error::EngineError;
use serde::Serialize;
use serde_json::json;
use std::fmt;

/// Application error type for the HTTP handlers.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Stable error code (for client error handling)
    code: String,
    /// Structured context for the client, when the code warrants it
    details: Option<serde_json::Value>,
    /// Internal error (for logging, not exposed to the client)
    source: Option<anyhow::Error>,
}

impl ApiError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            details: None,
            source: None,
        }
    }

    /// Attach a structured details payload.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach a source error for server-side logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            message.into(),
            "INVALID_REQUEST".to_string(),
        )
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// The HTTP status this error renders with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::InvalidRequest { .. } => Self::invalid(message),
            EngineError::NotFound { resource, id } => Self::not_found(resource, id),
            EngineError::SaleNotActive { starts_at, ends_at } => Self::new(
                StatusCode::CONFLICT,
                message,
                "SALE_NOT_ACTIVE".to_string(),
            )
            .with_details(json!({ "starts_at": starts_at, "ends_at": ends_at })),
            EngineError::InsufficientStock { remaining } => Self::new(
                StatusCode::CONFLICT,
                message,
                "INSUFFICIENT_STOCK".to_string(),
            )
            .with_details(json!({ "remaining": remaining })),
            EngineError::PurchaseLimitExceeded { already_claimed, cap } => Self::new(
                StatusCode::CONFLICT,
                message,
                "PURCHASE_LIMIT_EXCEEDED".to_string(),
            )
            .with_details(json!({ "already_claimed": already_claimed, "cap": cap })),
            EngineError::Busy => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "high demand, please retry".to_string(),
                "BUSY".to_string(),
            ),
            EngineError::Conflict { .. } => {
                Self::new(StatusCode::CONFLICT, message, "CONFLICT".to_string())
            }
            EngineError::Storage(detail) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred".to_string(),
                "STORAGE_ERROR".to_string(),
            )
            .with_source(anyhow::anyhow!(detail)),
        }
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Stable error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
    /// Structured context, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };

        (self.status, Json(body)).into_response()
    }
}
