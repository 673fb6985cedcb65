//! Observer trait for per-invoice rendering events.
//!
//! Inject an [`Arc<dyn InvoiceObserver>`] via
//! [`crate::config::InvoiceConfigBuilder::observer`] to receive events as the
//! layout pass draws each row. Callers can forward them to metrics, an audit
//! log, or a test harness without the pipeline knowing how they are consumed.
//!
//! # Example
//!
//! ```rust
//! use invoice_pdf_service::{InvoiceConfig, InvoiceObserver};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct SkippedImages {
//!     skipped: AtomicUsize,
//! }
//!
//! impl InvoiceObserver for SkippedImages {
//!     fn on_thumbnail_skipped(&self, index: usize, url: &str, error: &str) {
//!         self.skipped.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("row {index}: no image from {url}: {error}");
//!     }
//! }
//!
//! let observer = Arc::new(SkippedImages { skipped: AtomicUsize::new(0) });
//! let config = InvoiceConfig::builder()
//!     .observer(observer as Arc<dyn InvoiceObserver>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the layout pass while it builds one invoice.
///
/// Implementations must be `Send + Sync`: requests are served concurrently
/// and share the configured observer. All methods default to no-ops.
pub trait InvoiceObserver: Send + Sync {
    /// Called once before the first row is drawn.
    ///
    /// # Arguments
    /// * `owner`: owner identity of the order
    /// * `item_count`: number of rows that will be drawn
    fn on_render_start(&self, owner: &str, item_count: usize) {
        let _ = (owner, item_count);
    }

    /// Called after a row's text (and thumbnail, if any) is drawn.
    ///
    /// # Arguments
    /// * `index`: 0-based position in `order.items`
    /// * `page`: 1-based page the row landed on
    fn on_row_drawn(&self, index: usize, page: usize) {
        let _ = (index, page);
    }

    /// Called when a row's thumbnail could not be produced.
    fn on_thumbnail_skipped(&self, index: usize, url: &str, error: &str) {
        let _ = (index, url, error);
    }

    /// Called once the document bytes are serialised.
    fn on_render_complete(&self, pages: usize, rows: usize, byte_len: usize) {
        let _ = (pages, rows, byte_len);
    }
}

/// Default observer when none is configured.
pub struct NoopObserver;

impl InvoiceObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::InvoiceConfig`].
pub type SharedObserver = Arc<dyn InvoiceObserver>;
