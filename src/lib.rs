//! # invoice-pdf-service
//!
//! Generate PDF invoices for storefront orders, keep them in a blob store and
//! serve them back over HTTP.
//!
//! ## Pipeline Overview
//!
//! ```text
//! order JSON
//!  │
//!  ├─ 1. Validate  typed Order (names, quantities, amounts, owner)
//!  ├─ 2. Key       allocate factura-<owner>-<total>-<token>.pdf (persist mode)
//!  ├─ 3. Fetch     product images, bounded timeout, failures → blank cell
//!  ├─ 4. Layout    header, column band, rows, total, QR of the key
//!  ├─ 5. Assemble  lopdf document (spawn_blocking)
//!  └─ 6. Deliver   upload and return the locator, or stream the bytes
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_pdf_service::{
//!     generate_invoice, GeneratedInvoice, ImageFetcher, InvoiceConfig, InvoiceStore, LineItem,
//!     MemoryObjectStore, Order,
//! };
//! use bigdecimal::BigDecimal;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = InvoiceConfig::default();
//!     let fetcher = ImageFetcher::new(&config)?;
//!     let store = InvoiceStore::new(Arc::new(MemoryObjectStore::new("http://localhost:3000/invoices")));
//!
//!     let order = Order::new(
//!         vec![
//!             LineItem::new("Mug", 2, BigDecimal::from(10)),
//!             LineItem::new("Poster", 1, BigDecimal::from(25)).with_image("https://cdn.example.com/poster.png"),
//!         ],
//!         BigDecimal::from(45),
//!         "ana@example.com",
//!     );
//!
//!     if let GeneratedInvoice::Stored(stored) = generate_invoice(&order, &fetcher, Some(&store), &config).await? {
//!         println!("{}", stored.url);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice-server` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding only the library:
//! ```toml
//! invoice-pdf-service = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod generate;
pub mod observer;
pub mod order;
pub mod pipeline;
pub mod server;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DeliveryMode, InvoiceConfig, InvoiceConfigBuilder, SellerInfo, TotalPolicy};
pub use error::{InvoiceError, ThumbnailError};
pub use generate::{check_total, generate_invoice, render_invoice, GeneratedInvoice};
pub use observer::{InvoiceObserver, NoopObserver, SharedObserver};
pub use order::{format_amount, format_date, format_money, LineItem, Order};
pub use pipeline::fetch::ImageFetcher;
pub use pipeline::layout::InvoiceDocument;
pub use pipeline::normalize::{RasterImage, RasterPixels};
pub use pipeline::qr::encode_qr;
pub use server::{router, AppState};
pub use store::{
    BlobObject, FsObjectStore, HttpBlobStore, InvoiceStore, InvoiceSummary, MemoryObjectStore,
    ObjectStore, StoredInvoice, StoredInvoiceKey,
};
