//! Invoice layout: order + thumbnails + QR raster → paginated document.
//!
//! ## Page anatomy
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Seller name                Date: 8/3/2026    │
//! │ seller lines…              Customer: …       │
//! │                                              │
//! │ Invoice                                      │
//! │ ▓ Product  Quantity  Unit Price  Cost  Image ▓│  ← column band
//! │   row 1 …                              [img] │
//! │   row N …                              [img] │
//! │                      Total: $45.00           │
//! │                                   ┌──────┐   │
//! │ Thank you for your purchase!      │  QR  │   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Rows are drawn strictly in item order. When the next row would cross the
//! bottom margin a new page starts and repeats the column band. The total
//! and QR block always sit on the last page; if they do not fit under the
//! last row they get a page of their own.
//!
//! Thumbnails are drawn at a fixed 0.2 pt per pixel, right-aligned in the
//! image column and vertically centred in their row. A missing thumbnail
//! leaves the cell blank and nothing else about the row changes.

use crate::config::InvoiceConfig;
use crate::error::InvoiceError;
use crate::observer::{InvoiceObserver, NoopObserver};
use crate::order::{format_amount, format_date, format_money, LineItem, Order};
use crate::pipeline::fetch::ThumbnailSlot;
use crate::pipeline::normalize::RasterImage;
use crate::pipeline::pdf::{assemble, DocumentInfo, Font, PageCanvas, Rgb, PAGE_HEIGHT, PAGE_WIDTH};
use tracing::{debug, warn};

// ── Geometry (PDF points, origin bottom-left) ───────────────────────────

const MARGIN: f32 = 40.0;
const HEADER_TOP: f32 = PAGE_HEIGHT - 45.0;
const META_X: f32 = 400.0;
const TITLE_Y: f32 = 585.0;

const BAND_TOP_FIRST: f32 = 565.0;
const BAND_TOP_CONTINUED: f32 = PAGE_HEIGHT - MARGIN;
const BAND_HEIGHT: f32 = 20.0;

const ROW_HEIGHT: f32 = 56.0;
const ROW_TEXT_DROP: f32 = 31.0;
const CONTENT_BOTTOM: f32 = MARGIN;

/// Points per thumbnail pixel.
pub const THUMBNAIL_SCALE: f32 = 0.2;

const TOTAL_BLOCK: f32 = 30.0;
const QR_SIZE: f32 = 120.0;
const QR_X: f32 = PAGE_WIDTH - MARGIN - QR_SIZE;
const QR_Y: f32 = 90.0;
const NOTE_Y: f32 = 60.0;

const NAME_MAX_CHARS: usize = 34;
const CUSTOMER_MAX_CHARS: usize = 30;

const ACCENT: Rgb = [0.0, 0.53, 0.71];
const BAND_FILL: Rgb = [0.86, 0.92, 0.96];
const RULE: Rgb = [0.85, 0.85, 0.85];

/// Thumbnail XObject prefix.
pub const THUMBNAIL_PREFIX: &str = "Im";
/// QR XObject prefix.
pub const QR_PREFIX: &str = "Qr";

struct Columns {
    product: f32,
    quantity: f32,
    unit_price: f32,
    cost: Option<f32>,
    image_label: f32,
    image_right: f32,
}

impl Columns {
    fn for_config(config: &InvoiceConfig) -> Self {
        Self {
            product: MARGIN + 5.0,
            quantity: 250.0,
            unit_price: 320.0,
            cost: config.include_cost_column.then_some(400.0),
            image_label: 500.0,
            image_right: PAGE_WIDTH - MARGIN - 5.0,
        }
    }
}

/// A finished invoice and what went into it.
#[derive(Debug, Clone)]
pub struct InvoiceDocument {
    bytes: Vec<u8>,
    page_count: usize,
    rows_drawn: usize,
    thumbnails_embedded: usize,
    thumbnails_skipped: usize,
}

impl InvoiceDocument {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn rows_drawn(&self) -> usize {
        self.rows_drawn
    }

    pub fn thumbnails_embedded(&self) -> usize {
        self.thumbnails_embedded
    }

    /// Rows whose image reference could not be turned into a thumbnail.
    pub fn thumbnails_skipped(&self) -> usize {
        self.thumbnails_skipped
    }
}

/// Lay out `order` and serialise it.
///
/// `thumbnails` is positional: slot `i` belongs to `order.items[i]`. Missing
/// trailing slots are treated as "no image". CPU-bound; run under
/// `spawn_blocking` from async code.
pub fn compose(
    order: &Order,
    thumbnails: Vec<ThumbnailSlot>,
    qr: RasterImage,
    config: &InvoiceConfig,
) -> Result<InvoiceDocument, InvoiceError> {
    let noop = NoopObserver;
    let observer: &dyn InvoiceObserver = config.observer.as_deref().unwrap_or(&noop);
    observer.on_render_start(&order.owner, order.items.len());

    let columns = Columns::for_config(config);
    let mut finished: Vec<PageCanvas> = Vec::new();
    let mut page = PageCanvas::new();

    draw_header(&mut page, order, config);
    draw_column_band(&mut page, &columns, BAND_TOP_FIRST);
    let mut cursor = BAND_TOP_FIRST - BAND_HEIGHT;

    let mut embedded = 0;
    let mut skipped = 0;
    let mut slots = thumbnails.into_iter();

    for (index, item) in order.items.iter().enumerate() {
        if cursor - ROW_HEIGHT < CONTENT_BOTTOM {
            finished.push(std::mem::take(&mut page));
            draw_column_band(&mut page, &columns, BAND_TOP_CONTINUED);
            cursor = BAND_TOP_CONTINUED - BAND_HEIGHT;
            debug!("Row {} starts page {}", index, finished.len() + 1);
        }

        draw_row(&mut page, item, cursor, &columns, config);

        match slots.next().flatten() {
            Some(Ok(raster)) => {
                draw_thumbnail(&mut page, raster, cursor, &columns);
                embedded += 1;
            }
            Some(Err(e)) => {
                let url = item.image_ref.as_deref().unwrap_or_default();
                warn!("Row {} drawn without image: {}", index, e);
                observer.on_thumbnail_skipped(index, url, &e.to_string());
                skipped += 1;
            }
            None => {}
        }

        cursor -= ROW_HEIGHT;
        observer.on_row_drawn(index, finished.len() + 1);
    }

    if cursor - TOTAL_BLOCK < QR_Y + QR_SIZE + 10.0 {
        finished.push(std::mem::take(&mut page));
        cursor = BAND_TOP_CONTINUED;
    }
    draw_footer(&mut page, order, qr, cursor, &columns, config);
    finished.push(page);

    let page_count = finished.len();
    let rows_drawn = order.items.len();
    let bytes = assemble(
        finished,
        &DocumentInfo {
            title: format!("{} {}", config.title, order.owner),
            created_at: order.created_at,
        },
    )?;
    observer.on_render_complete(page_count, rows_drawn, bytes.len());

    Ok(InvoiceDocument {
        bytes,
        page_count,
        rows_drawn,
        thumbnails_embedded: embedded,
        thumbnails_skipped: skipped,
    })
}

fn draw_header(page: &mut PageCanvas, order: &Order, config: &InvoiceConfig) {
    if config.include_seller_header {
        page.text(Font::Bold, 14.0, MARGIN, HEADER_TOP, &config.seller.name);
        for (i, line) in config.seller.lines.iter().take(3).enumerate() {
            let y = HEADER_TOP - 16.0 - 12.0 * i as f32;
            page.text(Font::Regular, 9.0, MARGIN, y, line);
        }
    }

    let date = format_date(&order.created_at, &config.display_offset());
    page.text(Font::Regular, 10.0, META_X, HEADER_TOP, &format!("Date: {date}"));
    page.text(
        Font::Regular,
        10.0,
        META_X,
        HEADER_TOP - 14.0,
        &format!("Customer: {}", clip(&order.owner, CUSTOMER_MAX_CHARS)),
    );

    page.text_colored(Font::Bold, 20.0, MARGIN, TITLE_Y, ACCENT, &config.title);
}

fn draw_column_band(page: &mut PageCanvas, columns: &Columns, top: f32) {
    let y = top - BAND_HEIGHT;
    page.fill_rect(MARGIN, y, PAGE_WIDTH - 2.0 * MARGIN, BAND_HEIGHT, BAND_FILL);

    let text_y = y + 6.0;
    page.text(Font::Bold, 10.0, columns.product, text_y, "Product");
    page.text(Font::Bold, 10.0, columns.quantity, text_y, "Quantity");
    page.text(Font::Bold, 10.0, columns.unit_price, text_y, "Unit Price");
    if let Some(x) = columns.cost {
        page.text(Font::Bold, 10.0, x, text_y, "Cost");
    }
    page.text(Font::Bold, 10.0, columns.image_label, text_y, "Image");
}

fn draw_row(page: &mut PageCanvas, item: &LineItem, top: f32, columns: &Columns, config: &InvoiceConfig) {
    let y = top - ROW_TEXT_DROP;
    let symbol = &config.currency_symbol;

    page.text(Font::Regular, 11.0, columns.product, y, &clip(&item.name, NAME_MAX_CHARS));
    page.text(Font::Regular, 11.0, columns.quantity, y, &item.quantity.to_string());
    page.text(Font::Regular, 11.0, columns.unit_price, y, &format_money(symbol, &item.unit_price));
    if let Some(x) = columns.cost {
        page.text(Font::Regular, 11.0, x, y, &format_money(symbol, &item.cost));
    }
    page.fill_rect(MARGIN, top - ROW_HEIGHT, PAGE_WIDTH - 2.0 * MARGIN, 0.5, RULE);
}

fn draw_thumbnail(page: &mut PageCanvas, raster: RasterImage, top: f32, columns: &Columns) {
    let width = raster.width as f32 * THUMBNAIL_SCALE;
    let height = raster.height as f32 * THUMBNAIL_SCALE;
    let x = columns.image_right - width;
    let y = top - (ROW_HEIGHT + height) / 2.0;
    page.image(THUMBNAIL_PREFIX, raster, x, y, width, height);
}

fn draw_footer(
    page: &mut PageCanvas,
    order: &Order,
    qr: RasterImage,
    cursor: f32,
    columns: &Columns,
    config: &InvoiceConfig,
) {
    let total = format!(
        "Total: {}{}",
        config.currency_symbol,
        format_amount(&order.total)
    );
    page.text_colored(Font::Bold, 13.0, columns.unit_price, cursor - 24.0, ACCENT, &total);

    page.image(QR_PREFIX, qr, QR_X, QR_Y, QR_SIZE, QR_SIZE);

    if let Some(note) = &config.closing_note {
        page.text(Font::Regular, 10.0, MARGIN, NOTE_Y, note);
    }
}

/// Shorten `text` to `max` characters, marking the cut with `...`.
fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThumbnailError;
    use crate::observer::InvoiceObserver;
    use crate::pipeline::normalize::RasterPixels;
    use crate::pipeline::pdf::testing::{page_images, page_texts};
    use crate::pipeline::qr::encode_qr;
    use bigdecimal::BigDecimal;
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn order(items: Vec<LineItem>, total: &str) -> Order {
        Order {
            items,
            total: dec(total),
            owner: "ana@example.com".into(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 8, 10, 0, 0).unwrap(),
        }
    }

    fn thumb(w: u32, h: u32) -> RasterImage {
        RasterImage {
            width: w,
            height: h,
            pixels: RasterPixels::Rgb {
                rgb: vec![10; (w * h * 3) as usize],
                alpha: None,
            },
        }
    }

    fn qr() -> RasterImage {
        encode_qr("factura-ana@example.com-45.00.pdf").unwrap()
    }

    fn all_text(bytes: &[u8]) -> Vec<String> {
        page_texts(bytes).into_iter().flatten().collect()
    }

    fn count(texts: &[String], needle: &str) -> usize {
        texts.iter().filter(|t| t.as_str() == needle).count()
    }

    #[test]
    fn two_row_invoice() {
        let o = order(
            vec![
                LineItem::new("A", 2, dec("10")),
                LineItem::new("B", 1, dec("25")),
            ],
            "45",
        );
        let doc = compose(&o, vec![None, None], qr(), &InvoiceConfig::default()).unwrap();

        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.rows_drawn(), 2);

        let texts = all_text(doc.as_bytes());
        assert_eq!(count(&texts, "A"), 1);
        assert_eq!(count(&texts, "B"), 1);
        assert_eq!(count(&texts, "$20.00"), 1);
        assert_eq!(count(&texts, "$25.00"), 2); // unit price and cost
        assert_eq!(count(&texts, "Total: $45.00"), 1);
        assert_eq!(count(&texts, "Date: 8/3/2026"), 1);

        let images = page_images(doc.as_bytes());
        assert_eq!(images, vec![vec!["Qr1".to_string()]]);
    }

    #[test]
    fn rows_keep_item_order() {
        let o = order(
            vec![
                LineItem::new("first", 1, dec("1")),
                LineItem::new("second", 1, dec("1")),
                LineItem::new("third", 1, dec("1")),
            ],
            "3",
        );
        let doc = compose(&o, vec![], qr(), &InvoiceConfig::default()).unwrap();
        let texts = all_text(doc.as_bytes());
        let pos = |name: &str| texts.iter().position(|t| t == name).unwrap();
        assert!(pos("first") < pos("second"));
        assert!(pos("second") < pos("third"));
    }

    #[test]
    fn failed_thumbnail_leaves_cell_blank() {
        let o = order(
            vec![
                LineItem::new("A", 1, dec("5")).with_image("http://img/a.png"),
                LineItem::new("B", 1, dec("5")).with_image("http://img/missing.png"),
            ],
            "10",
        );
        let slots = vec![
            Some(Ok(thumb(240, 120))),
            Some(Err(ThumbnailError::HttpStatus {
                url: "http://img/missing.png".into(),
                status: 404,
            })),
        ];
        let doc = compose(&o, slots, qr(), &InvoiceConfig::default()).unwrap();
        assert_eq!(doc.thumbnails_embedded(), 1);
        assert_eq!(doc.thumbnails_skipped(), 1);
        assert_eq!(count(&all_text(doc.as_bytes()), "B"), 1);
        assert_eq!(
            page_images(doc.as_bytes()),
            vec![vec!["Im1".to_string(), "Qr1".to_string()]]
        );
    }

    #[test]
    fn cost_column_can_be_hidden() {
        let o = order(vec![LineItem::new("A", 2, dec("10"))], "20");
        let config = InvoiceConfig::builder()
            .include_cost_column(false)
            .build()
            .unwrap();
        let doc = compose(&o, vec![], qr(), &config).unwrap();
        let texts = all_text(doc.as_bytes());
        assert_eq!(count(&texts, "Cost"), 0);
        assert_eq!(count(&texts, "$20.00"), 0);
        assert_eq!(count(&texts, "Total: $20.00"), 1);
    }

    #[test]
    fn seller_header_is_optional() {
        let o = order(vec![LineItem::new("A", 1, dec("1"))], "1");
        let with = compose(&o, vec![], qr(), &InvoiceConfig::default()).unwrap();
        assert_eq!(count(&all_text(with.as_bytes()), "Online Store"), 1);

        let config = InvoiceConfig::builder()
            .include_seller_header(false)
            .build()
            .unwrap();
        let without = compose(&o, vec![], qr(), &config).unwrap();
        assert_eq!(count(&all_text(without.as_bytes()), "Online Store"), 0);
    }

    #[test]
    fn long_orders_paginate_with_repeated_band() {
        let items: Vec<_> = (0..30)
            .map(|i| LineItem::new(format!("item {i}"), 1, dec("1")))
            .collect();
        let o = order(items, "30");
        let doc = compose(&o, vec![], qr(), &InvoiceConfig::default()).unwrap();

        assert!(doc.page_count() > 1, "30 rows must not fit on one page");
        let pages = page_texts(doc.as_bytes());
        assert_eq!(pages.len(), doc.page_count());
        for page in &pages {
            assert_eq!(count(page, "Product"), 1, "every page repeats the band");
        }

        let texts: Vec<String> = pages.iter().flatten().cloned().collect();
        for i in 0..30 {
            assert_eq!(count(&texts, &format!("item {i}")), 1);
        }
        assert_eq!(count(&texts, "Total: $30.00"), 1);
        let last = pages.last().unwrap();
        assert_eq!(count(last, "Total: $30.00"), 1);

        let images: Vec<String> = page_images(doc.as_bytes()).into_iter().flatten().collect();
        assert_eq!(images.iter().filter(|n| n.starts_with(QR_PREFIX)).count(), 1);
    }

    #[test]
    fn empty_order_still_renders() {
        let o = order(vec![], "0");
        let doc = compose(&o, vec![], qr(), &InvoiceConfig::default()).unwrap();
        assert_eq!(doc.rows_drawn(), 0);
        assert_eq!(count(&all_text(doc.as_bytes()), "Total: $0.00"), 1);
    }

    #[test]
    fn long_names_are_clipped() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("abcdefghijkl", 10), "abcdefg...");
        assert_eq!(clip("ñandú ñandú ñandú", 8), "ñandú...");
    }

    #[test]
    fn observer_sees_every_row() {
        struct Counter {
            rows: AtomicUsize,
            skipped: AtomicUsize,
            completed: AtomicUsize,
        }
        impl InvoiceObserver for Counter {
            fn on_row_drawn(&self, _index: usize, _page: usize) {
                self.rows.fetch_add(1, Ordering::SeqCst);
            }
            fn on_thumbnail_skipped(&self, _index: usize, _url: &str, _error: &str) {
                self.skipped.fetch_add(1, Ordering::SeqCst);
            }
            fn on_render_complete(&self, _pages: usize, rows: usize, _byte_len: usize) {
                self.completed.store(rows, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(Counter {
            rows: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        });
        let config = InvoiceConfig::builder()
            .observer(counter.clone())
            .build()
            .unwrap();
        let o = order(
            vec![
                LineItem::new("A", 1, dec("1")).with_image("http://x/a.png"),
                LineItem::new("B", 1, dec("1")),
            ],
            "2",
        );
        let slots = vec![
            Some(Err(ThumbnailError::Timeout {
                url: "http://x/a.png".into(),
                secs: 10,
            })),
            None,
        ];
        compose(&o, slots, qr(), &config).unwrap();

        assert_eq!(counter.rows.load(Ordering::SeqCst), 2);
        assert_eq!(counter.skipped.load(Ordering::SeqCst), 1);
        assert_eq!(counter.completed.load(Ordering::SeqCst), 2);
    }
}
