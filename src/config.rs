//! Configuration for invoice rendering and delivery.
//!
//! Every optional feature of the generate pipeline is selected here rather
//! than by separate handler variants: whether the PDF is persisted or
//! streamed back, whether the seller header and cost column are drawn, how a
//! caller-supplied total is treated, and how product images are fetched.
//!
//! Built via [`InvoiceConfig::builder()`] or [`InvoiceConfig::default()`].

use crate::error::InvoiceError;
use crate::observer::SharedObserver;
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration shared by every request.
///
/// # Example
/// ```rust
/// use invoice_pdf_service::{DeliveryMode, InvoiceConfig};
///
/// let config = InvoiceConfig::builder()
///     .delivery(DeliveryMode::Stream)
///     .include_cost_column(false)
///     .image_timeout_secs(5)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct InvoiceConfig {
    /// Persist to the object store and answer with a locator, or stream the
    /// PDF bytes back. Default: [`DeliveryMode::Persist`].
    pub delivery: DeliveryMode,

    /// Draw the seller identity block at the top-left. Default: true.
    pub include_seller_header: bool,

    /// Seller identity shown when `include_seller_header` is set.
    pub seller: SellerInfo,

    /// Draw the per-row cost column. Default: true.
    pub include_cost_column: bool,

    /// Document title. Default: "Invoice".
    pub title: String,

    /// Courtesy line under the QR block. Default: a thank-you note.
    pub closing_note: Option<String>,

    /// Prefix for every currency amount. Default: "$".
    pub currency_symbol: String,

    /// QR payload used when the invoice has no storage key (stream mode).
    pub qr_fallback: String,

    /// Per-image fetch timeout in seconds. Default: 10.
    ///
    /// An expired fetch only blanks that row's image cell.
    pub image_timeout_secs: u64,

    /// Product images fetched at once. Default: 4.
    ///
    /// Only the network/decode step is concurrent; rows are always drawn in
    /// item order.
    pub fetch_concurrency: usize,

    /// Longest edge, in pixels, a thumbnail is down-scaled to. Default: 240.
    ///
    /// At the fixed draw scale of 0.2 pt/px this caps a thumbnail at 48 pt,
    /// which is what the row height is sized for.
    pub thumbnail_max_px: u32,

    /// How the declared total is checked against the items. Default: [`TotalPolicy::Trust`].
    pub total_policy: TotalPolicy,

    /// Owner identity used when the request carries no email. Default: "anonymous".
    pub default_owner: String,

    /// Minutes east of UTC used to print dates. Default: 0.
    pub utc_offset_minutes: i32,

    /// Rendering event sink.
    pub observer: Option<SharedObserver>,
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryMode::default(),
            include_seller_header: true,
            seller: SellerInfo::default(),
            include_cost_column: true,
            title: "Invoice".to_string(),
            closing_note: Some("Thank you for your purchase!".to_string()),
            currency_symbol: "$".to_string(),
            qr_fallback: "invoice".to_string(),
            image_timeout_secs: 10,
            fetch_concurrency: 4,
            thumbnail_max_px: 240,
            total_policy: TotalPolicy::default(),
            default_owner: "anonymous".to_string(),
            utc_offset_minutes: 0,
            observer: None,
        }
    }
}

impl fmt::Debug for InvoiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvoiceConfig")
            .field("delivery", &self.delivery)
            .field("include_seller_header", &self.include_seller_header)
            .field("seller", &self.seller)
            .field("include_cost_column", &self.include_cost_column)
            .field("title", &self.title)
            .field("closing_note", &self.closing_note)
            .field("currency_symbol", &self.currency_symbol)
            .field("qr_fallback", &self.qr_fallback)
            .field("image_timeout_secs", &self.image_timeout_secs)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("thumbnail_max_px", &self.thumbnail_max_px)
            .field("total_policy", &self.total_policy)
            .field("default_owner", &self.default_owner)
            .field("utc_offset_minutes", &self.utc_offset_minutes)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn InvoiceObserver>"))
            .finish()
    }
}

impl InvoiceConfig {
    /// Create a new builder for `InvoiceConfig`.
    pub fn builder() -> InvoiceConfigBuilder {
        InvoiceConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    /// Offset used for every printed date. Falls back to UTC if out of range.
    pub fn display_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

/// Builder for [`InvoiceConfig`].
#[derive(Debug)]
pub struct InvoiceConfigBuilder {
    config: InvoiceConfig,
}

impl InvoiceConfigBuilder {
    pub fn delivery(mut self, mode: DeliveryMode) -> Self {
        self.config.delivery = mode;
        self
    }

    pub fn include_seller_header(mut self, v: bool) -> Self {
        self.config.include_seller_header = v;
        self
    }

    pub fn seller(mut self, seller: SellerInfo) -> Self {
        self.config.seller = seller;
        self
    }

    pub fn include_cost_column(mut self, v: bool) -> Self {
        self.config.include_cost_column = v;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    pub fn closing_note(mut self, note: Option<String>) -> Self {
        self.config.closing_note = note;
        self
    }

    pub fn currency_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.config.currency_symbol = symbol.into();
        self
    }

    pub fn qr_fallback(mut self, payload: impl Into<String>) -> Self {
        self.config.qr_fallback = payload.into();
        self
    }

    pub fn image_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_timeout_secs = secs.max(1);
        self
    }

    pub fn fetch_concurrency(mut self, n: usize) -> Self {
        self.config.fetch_concurrency = n.max(1);
        self
    }

    pub fn thumbnail_max_px(mut self, px: u32) -> Self {
        self.config.thumbnail_max_px = px.clamp(16, 2048);
        self
    }

    pub fn total_policy(mut self, policy: TotalPolicy) -> Self {
        self.config.total_policy = policy;
        self
    }

    pub fn default_owner(mut self, owner: impl Into<String>) -> Self {
        self.config.default_owner = owner.into();
        self
    }

    pub fn utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.config.utc_offset_minutes = minutes;
        self
    }

    pub fn observer(mut self, observer: SharedObserver) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<InvoiceConfig, InvoiceError> {
        let c = &self.config;
        if c.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(InvoiceError::InvalidConfig(format!(
                "UTC offset must be within ±1439 minutes, got {}",
                c.utc_offset_minutes
            )));
        }
        if c.default_owner.trim().is_empty() || c.default_owner.contains('/') {
            return Err(InvoiceError::InvalidConfig(format!(
                "Default owner '{}' is not a valid key segment",
                c.default_owner
            )));
        }
        if c.qr_fallback.is_empty() {
            return Err(InvoiceError::InvalidConfig(
                "QR fallback payload must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What the generate endpoint does with a finished document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Upload to the object store and answer with the public locator. (default)
    #[default]
    Persist,
    /// Answer with the raw PDF bytes; nothing is stored.
    Stream,
}

/// Treatment of the caller's declared total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalPolicy {
    /// Print the declared total as-is; a mismatch is only logged. (default)
    #[default]
    Trust,
    /// Reject orders whose total differs from the sum of line costs.
    Verify,
}

/// Seller identity printed in the header block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerInfo {
    pub name: String,
    /// Extra lines under the name (tax id, address, contact). At most three are drawn.
    pub lines: Vec<String>,
}

impl Default for SellerInfo {
    fn default() -> Self {
        Self {
            name: "Online Store".to_string(),
            lines: Vec::new(),
        }
    }
}
