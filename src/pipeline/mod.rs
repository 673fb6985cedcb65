//! Pipeline stages for invoice generation.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested without the others (layout tests never touch the network, fetch
//! tests never build a PDF).
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ normalize ──┐
//! (HTTP)    (decode)    ├──▶ layout ──▶ pdf
//!                qr ────┘    (rows)     (lopdf)
//! ```
//!
//! 1. [`fetch`]: download each product image with a bounded timeout;
//!    the only stage with network I/O
//! 2. [`normalize`]: decode PNG/JPEG/WebP into an embeddable raster, capped
//!    in size; runs in `spawn_blocking`
//! 3. [`qr`]: encode the storage key (or fallback payload) as a QR
//!    raster
//! 4. [`layout`]: place header, rows, thumbnails, total and QR on
//!    paginated canvases
//! 5. [`pdf`]: serialise canvases, fonts and images with `lopdf`

pub mod fetch;
pub mod layout;
pub mod normalize;
pub mod pdf;
pub mod qr;
