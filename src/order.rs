//! Order domain types: line items, orders and money formatting.
//!
//! These are the validated, typed values the layout engine consumes. Raw
//! request payloads are turned into an [`Order`] once, at the HTTP boundary
//! (see [`crate::server::request`]); nothing downstream touches JSON.

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

/// One product entry on an invoice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: BigDecimal,
    /// Remote product image. `None` leaves the image cell blank without a fetch.
    pub image_ref: Option<String>,
    /// Display cost. Defaults to `quantity × unit_price`; a caller-supplied
    /// value is trusted as-is.
    pub cost: BigDecimal,
}

impl LineItem {
    /// Build an item whose cost is derived from quantity and unit price.
    pub fn new(name: impl Into<String>, quantity: u32, unit_price: BigDecimal) -> Self {
        let cost = &unit_price * BigDecimal::from(quantity);
        Self {
            name: name.into(),
            quantity,
            unit_price,
            image_ref: None,
            cost,
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_ref = Some(url.into());
        self
    }

    pub fn with_cost(mut self, cost: BigDecimal) -> Self {
        self.cost = cost;
        self
    }
}

/// A purchase to be rendered as one invoice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    /// Display order; the layout never re-sorts.
    pub items: Vec<LineItem>,
    /// Shown as-is. See [`crate::config::TotalPolicy`].
    pub total: BigDecimal,
    /// Owner identity (usually an email) used to scope storage keys.
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(items: Vec<LineItem>, total: BigDecimal, owner: impl Into<String>) -> Self {
        Self {
            items,
            total,
            owner: owner.into(),
            created_at: Utc::now(),
        }
    }

    /// Sum of the per-item costs.
    pub fn items_total(&self) -> BigDecimal {
        self.items
            .iter()
            .fold(BigDecimal::zero(), |acc, item| acc + &item.cost)
    }
}

/// Format a value with exactly two decimal places (`45` → `45.00`).
///
/// Rounding happens here only, at display time. A value that rounds to zero
/// comes back without a fractional part, so the fraction is padded here.
pub fn format_amount(value: &BigDecimal) -> String {
    let rounded = value.with_scale_round(2, RoundingMode::HalfUp).to_string();
    match rounded.split_once('.') {
        Some((whole, fraction)) => format!("{whole}.{fraction:0<2}"),
        None => format!("{rounded}.00"),
    }
}

/// Format a value as currency (`$45.00`).
pub fn format_money(symbol: &str, value: &BigDecimal) -> String {
    format!("{symbol}{}", format_amount(value))
}

/// `d/m/yyyy`, the numeric es-ES date style used on invoices and listings.
pub fn format_date(at: &DateTime<Utc>, offset: &FixedOffset) -> String {
    at.with_timezone(offset).format("%-d/%-m/%Y").to_string()
}
