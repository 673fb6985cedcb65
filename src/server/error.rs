//! HTTP error mapping.
//!
//! Every failure leaves the service as `{"success": false, "error": "<msg>"}`
//! with a status that tells the caller whose fault it was.

use crate::error::InvoiceError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Payload or query failed to parse or validate.
    #[error("{0}")]
    BadRequest(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    /// The generate pipeline failed.
    #[error("failed to generate invoice: {0}")]
    Generation(InvoiceError),

    /// Any other store or pipeline failure.
    #[error("{0}")]
    Invoice(#[from] InvoiceError),
}

impl ServiceError {
    fn inner(&self) -> Option<&InvoiceError> {
        match self {
            ServiceError::Generation(e) | ServiceError::Invoice(e) => Some(e),
            _ => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ServiceError::Generation(e) | ServiceError::Invoice(e) => match e {
                e if e.is_validation() => StatusCode::BAD_REQUEST,
                InvoiceError::InvoiceNotFound { .. } => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Client-facing message. Validation and configuration errors are shown
    /// bare; generation failures carry their cause.
    pub fn message(&self) -> String {
        match self.inner() {
            Some(InvoiceError::StorageNotConfigured) => InvoiceError::StorageNotConfigured.to_string(),
            Some(e) if e.is_validation() => e.to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            error!(status = status.as_u16(), "{}", message);
        } else {
            warn!(status = status.as_u16(), "{}", message);
        }
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
