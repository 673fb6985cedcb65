//! HTTP surface.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | POST | `/api/generar-pdf` | render an invoice; persist it or stream it back |
//! | GET  | `/api/GetFacturas?email=` | list an owner's invoices, newest first |
//! | POST | `/api/DeletePdf` | delete one invoice by locator |
//! | GET  | `/invoices/{key}` | serve a stored invoice (memory/fs backends) |
//! | GET  | `/health` | liveness and active configuration |
//!
//! Known paths hit with another method answer 405 with the JSON error body.

pub mod error;
pub mod handlers;
pub mod request;

pub use error::ServiceError;

use crate::config::InvoiceConfig;
use crate::error::InvoiceError;
use crate::pipeline::fetch::ImageFetcher;
use crate::store::InvoiceStore;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared per-process state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<InvoiceConfig>,
    pub fetcher: ImageFetcher,
    /// `None` when no backend is configured; persist, list and delete then
    /// fail with "storage not configured".
    pub store: Option<InvoiceStore>,
}

impl AppState {
    pub fn new(config: InvoiceConfig, store: Option<InvoiceStore>) -> Result<Self, InvoiceError> {
        let fetcher = ImageFetcher::new(&config)?;
        Ok(Self {
            config: Arc::new(config),
            fetcher,
            store,
        })
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/generar-pdf",
            post(handlers::generate).fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/GetFacturas",
            get(handlers::list_invoices).fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/DeletePdf",
            post(handlers::delete_invoice).fallback(handlers::method_not_allowed),
        )
        .route("/invoices/{key}", get(handlers::download))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
