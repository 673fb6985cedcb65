//! Error types for the invoice pipeline.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`InvoiceError`]: **Fatal**: the request cannot produce an invoice at
//!   all (malformed order, QR encoder failure, PDF assembly failure, storage
//!   failure). Returned as `Err(InvoiceError)` from the `generate*` and store
//!   functions.
//!
//! * [`ThumbnailError`]: **Non-fatal**: a single product image could not be
//!   fetched or decoded. The layout pass leaves that image cell blank and
//!   keeps going; the error only reaches the log and the
//!   [`crate::observer::InvoiceObserver`].

use thiserror::Error;

/// All fatal errors returned by the invoice pipeline and store.
#[derive(Debug, Error)]
pub enum InvoiceError {
    // ── Validation errors ────────────────────────────────────────────────
    /// The order payload is structurally valid JSON but violates a field rule.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// The declared total does not match the line items (only under `TotalPolicy::Verify`).
    #[error("Declared total {declared} does not match the sum of line costs {computed}")]
    TotalMismatch { declared: String, computed: String },

    // ── Encoding errors ──────────────────────────────────────────────────
    /// The QR block is mandatory; failing to encode it aborts the document.
    #[error("QR encoding failed for payload '{payload}': {detail}")]
    QrEncodingFailed { payload: String, detail: String },

    /// lopdf could not encode a content stream or serialise the document.
    #[error("PDF assembly failed: {0}")]
    DocumentAssembly(String),

    // ── Storage errors ───────────────────────────────────────────────────
    /// No object store is configured (e.g. missing blob token).
    #[error("storage not configured")]
    StorageNotConfigured,

    /// The object store rejected a put/list/get/delete call.
    #[error("Storage {operation} failed: {detail}")]
    Storage {
        operation: &'static str,
        detail: String,
    },

    /// Delete or download targeted an object the store does not hold.
    #[error("Invoice not found: '{locator}'")]
    InvoiceNotFound { locator: String },

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl InvoiceError {
    pub(crate) fn storage(operation: &'static str, detail: impl ToString) -> Self {
        InvoiceError::Storage {
            operation,
            detail: detail.to_string(),
        }
    }

    /// True for errors caused by the caller's payload rather than by the service.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            InvoiceError::InvalidOrder(_) | InvoiceError::TotalMismatch { .. }
        )
    }
}

/// A non-fatal error for a single product thumbnail.
///
/// Produced by [`crate::pipeline::fetch::ImageFetcher::normalize`]. The
/// layout engine skips the image for that row and the document is still
/// produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThumbnailError {
    /// The image reference is not an absolute HTTP/HTTPS URL.
    #[error("Invalid image URL '{url}'")]
    InvalidUrl { url: String },

    /// Connection or transfer failure.
    #[error("Failed to fetch '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    /// The fetch exceeded the configured timeout.
    #[error("Fetching '{url}' timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// The image source answered with a non-success status.
    #[error("Fetching '{url}' returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// The declared content type is not one the embedder supports.
    #[error("Unsupported image type '{content_type}' at '{url}'")]
    UnsupportedType { url: String, content_type: String },

    /// The body exceeded the per-image size limit.
    #[error("Image at '{url}' exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },

    /// The bytes do not decode as the declared type.
    #[error("Could not decode image at '{url}': {detail}")]
    DecodeFailed { url: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_not_configured_display() {
        assert_eq!(
            InvoiceError::StorageNotConfigured.to_string(),
            "storage not configured"
        );
    }

    #[test]
    fn total_mismatch_display() {
        let e = InvoiceError::TotalMismatch {
            declared: "45.00".into(),
            computed: "40.00".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("45.00"), "got: {msg}");
        assert!(msg.contains("40.00"), "got: {msg}");
        assert!(e.is_validation());
    }

    #[test]
    fn storage_error_is_not_validation() {
        let e = InvoiceError::storage("put", "403 Forbidden");
        assert!(!e.is_validation());
        assert!(e.to_string().contains("put"));
        assert!(e.to_string().contains("403"));
    }

    #[test]
    fn thumbnail_status_display() {
        let e = ThumbnailError::HttpStatus {
            url: "http://img/x.png".into(),
            status: 404,
        };
        assert!(e.to_string().contains("404"));
        assert!(e.to_string().contains("http://img/x.png"));
    }
}
