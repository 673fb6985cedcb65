//! Invoice generation entry points.
//!
//! [`render_invoice`] is the pure document step: fetch thumbnails, encode
//! the QR payload, lay out and serialise. [`generate_invoice`] wraps it with
//! the delivery policy from [`InvoiceConfig::delivery`]: in persist mode a
//! storage key is allocated first (it is the QR payload), the document is
//! rendered, then uploaded under that key; in stream mode the bytes are
//! handed back untouched and nothing is stored.

use crate::config::{DeliveryMode, InvoiceConfig, TotalPolicy};
use crate::error::InvoiceError;
use crate::order::{format_amount, Order};
use crate::pipeline::fetch::ImageFetcher;
use crate::pipeline::layout::{self, InvoiceDocument};
use crate::pipeline::qr;
use crate::store::{InvoiceStore, StoredInvoice};
use bigdecimal::RoundingMode;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of [`generate_invoice`], one variant per [`DeliveryMode`].
#[derive(Debug, Clone)]
pub enum GeneratedInvoice {
    /// Uploaded; the locator is publicly dereferenceable.
    Stored(StoredInvoice),
    /// Returned to the caller as raw PDF bytes.
    Inline(InvoiceDocument),
}

/// Render `order` into a PDF whose QR block encodes `qr_payload`.
///
/// # Errors
/// Only fatal conditions fail the call: a QR payload that cannot be
/// encoded, or a document that cannot be serialised. Image failures are
/// absorbed into blank cells (see [`InvoiceDocument::thumbnails_skipped`]).
pub async fn render_invoice(
    order: &Order,
    qr_payload: &str,
    fetcher: &ImageFetcher,
    config: &InvoiceConfig,
) -> Result<InvoiceDocument, InvoiceError> {
    let start = Instant::now();
    info!(
        "Rendering invoice for '{}' with {} items",
        order.owner,
        order.items.len()
    );

    // ── Step 1: Fetch thumbnails ─────────────────────────────────────────
    let fetch_start = Instant::now();
    let thumbnails = fetcher
        .normalize_all(&order.items, config.fetch_concurrency)
        .await;
    debug!(
        "Resolved {} image slots in {}ms",
        thumbnails.iter().filter(|s| s.is_some()).count(),
        fetch_start.elapsed().as_millis()
    );

    // ── Step 2: QR, layout and serialisation ─────────────────────────────
    let order = order.clone();
    let payload = qr_payload.to_string();
    let config = config.clone();
    let document = tokio::task::spawn_blocking(move || {
        let qr = qr::encode_qr(&payload)?;
        layout::compose(&order, thumbnails, qr, &config)
    })
    .await
    .map_err(|e| InvoiceError::Internal(format!("Render task panicked: {}", e)))??;

    info!(
        "Rendered {} rows on {} pages ({} bytes, {} images skipped) in {}ms",
        document.rows_drawn(),
        document.page_count(),
        document.len(),
        document.thumbnails_skipped(),
        start.elapsed().as_millis()
    );
    Ok(document)
}

/// Render `order` and deliver it according to `config.delivery`.
///
/// In persist mode `store` must be `Some`; otherwise the call fails with
/// [`InvoiceError::StorageNotConfigured`] before any rendering work.
pub async fn generate_invoice(
    order: &Order,
    fetcher: &ImageFetcher,
    store: Option<&InvoiceStore>,
    config: &InvoiceConfig,
) -> Result<GeneratedInvoice, InvoiceError> {
    check_total(order, config.total_policy)?;

    match config.delivery {
        DeliveryMode::Persist => {
            let store = store.ok_or(InvoiceError::StorageNotConfigured)?;
            let key = store.allocate_key(&order.owner, &order.total);
            let document = render_invoice(order, key.as_str(), fetcher, config).await?;
            let stored = store.put(&key, &document).await?;
            Ok(GeneratedInvoice::Stored(stored))
        }
        DeliveryMode::Stream => {
            let document = render_invoice(order, &config.qr_fallback, fetcher, config).await?;
            Ok(GeneratedInvoice::Inline(document))
        }
    }
}

/// Compare the declared total with the sum of line costs, at display precision.
pub fn check_total(order: &Order, policy: TotalPolicy) -> Result<(), InvoiceError> {
    let computed = order.items_total();
    let matches = order.total.with_scale_round(2, RoundingMode::HalfUp)
        == computed.with_scale_round(2, RoundingMode::HalfUp);
    if matches {
        return Ok(());
    }

    let declared = format_amount(&order.total);
    let computed = format_amount(&computed);
    match policy {
        TotalPolicy::Trust => {
            warn!(
                "Declared total {} differs from line costs {} for '{}'; printing as declared",
                declared, computed, order.owner
            );
            Ok(())
        }
        TotalPolicy::Verify => Err(InvoiceError::TotalMismatch { declared, computed }),
    }
}
