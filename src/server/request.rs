//! Wire schema for the HTTP endpoints and its validation into domain types.
//!
//! Field names follow the storefront that calls this service: English and
//! Spanish spellings are both accepted for every product field.

use crate::error::InvoiceError;
use crate::order::{format_amount, LineItem, Order};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

/// Longest owner identity accepted (an email address can be at most 254 chars).
const MAX_OWNER_LEN: usize = 254;

/// Most digits allowed left of the decimal point in any amount.
const MAX_WHOLE_DIGITS: i64 = 15;

/// Most fractional digits allowed in any amount. JSON floats arrive as their
/// exact binary expansion, which runs to about 60 places for cent values.
const MAX_FRACTION_DIGITS: i64 = 100;

/// Body of `POST /api/generar-pdf`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub products: Vec<ProductInput>,
    pub total: BigDecimal,
    #[serde(default)]
    pub email: Option<String>,
}

/// One entry of `products`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(
        alias = "cantidad",
        alias = "qty",
        deserialize_with = "quantity_from_number_or_string"
    )]
    pub quantity: u32,
    #[serde(alias = "precio", alias = "unitPrice", alias = "unit_price")]
    pub price: BigDecimal,
    #[serde(default, alias = "imagen", alias = "imageUrl", alias = "imageRef")]
    pub image: Option<String>,
    #[serde(default, alias = "computedCost")]
    pub cost: Option<BigDecimal>,
}

impl GenerateRequest {
    /// Validate and convert into an [`Order`].
    ///
    /// An absent or blank email falls back to `default_owner`.
    pub fn into_order(self, default_owner: &str, now: DateTime<Utc>) -> Result<Order, InvoiceError> {
        if self.products.is_empty() {
            return Err(InvoiceError::InvalidOrder(
                "products must contain at least one item".into(),
            ));
        }
        check_magnitude(&self.total)
            .map_err(|msg| InvoiceError::InvalidOrder(format!("total {msg}")))?;
        if self.total < BigDecimal::zero() {
            return Err(InvoiceError::InvalidOrder(format!(
                "total must not be negative, got {}",
                format_amount(&self.total)
            )));
        }

        let owner = match self.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => default_owner.to_string(),
        };
        validate_owner(&owner)?;

        let items = self
            .products
            .into_iter()
            .enumerate()
            .map(|(i, p)| p.into_line_item(i))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Order {
            items,
            total: self.total,
            owner,
            created_at: now,
        })
    }
}

impl ProductInput {
    fn into_line_item(self, index: usize) -> Result<LineItem, InvoiceError> {
        let invalid = |msg: String| InvoiceError::InvalidOrder(format!("products[{index}]: {msg}"));

        let name = self.name.trim();
        if name.is_empty() {
            return Err(invalid("name must not be empty".into()));
        }
        if self.quantity == 0 {
            return Err(invalid("quantity must be at least 1".into()));
        }
        check_magnitude(&self.price).map_err(|msg| invalid(format!("price {msg}")))?;
        if self.price < BigDecimal::zero() {
            return Err(invalid("price must not be negative".into()));
        }

        let mut item = LineItem::new(name, self.quantity, self.price);
        if let Some(cost) = self.cost {
            check_magnitude(&cost).map_err(|msg| invalid(format!("cost {msg}")))?;
            if cost < BigDecimal::zero() {
                return Err(invalid("cost must not be negative".into()));
            }
            item = item.with_cost(cost);
        }
        if let Some(url) = self.image.filter(|u| !u.trim().is_empty()) {
            item = item.with_image(url.trim());
        }
        Ok(item)
    }
}

/// Reject amounts whose exponent would make rounding or printing them
/// allocate without bound (`1e999999999`).
fn check_magnitude(value: &BigDecimal) -> Result<(), String> {
    let (_, scale) = value.as_bigint_and_exponent();
    if scale > MAX_FRACTION_DIGITS {
        return Err(format!("has more than {MAX_FRACTION_DIGITS} decimal places"));
    }
    let whole_digits = (value.digits() as i64).saturating_sub(scale);
    if whole_digits > MAX_WHOLE_DIGITS {
        return Err(format!("exceeds {MAX_WHOLE_DIGITS} integer digits"));
    }
    Ok(())
}

/// Accept `2` as well as `"2"`.
fn quantity_from_number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Quantity {
        Number(u32),
        Text(String),
    }

    match Quantity::deserialize(deserializer)? {
        Quantity::Number(n) => Ok(n),
        Quantity::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid quantity '{text}'"))),
    }
}

/// Owner identities become part of a storage key.
pub fn validate_owner(owner: &str) -> Result<(), InvoiceError> {
    if owner.is_empty() || owner.len() > MAX_OWNER_LEN {
        return Err(InvoiceError::InvalidOrder(format!(
            "email must be 1-{MAX_OWNER_LEN} characters"
        )));
    }
    if owner.contains(|c: char| c == '/' || c == '\\' || c.is_whitespace() || c.is_control()) {
        return Err(InvoiceError::InvalidOrder(format!(
            "email '{owner}' contains characters not allowed in a storage key"
        )));
    }
    Ok(())
}

/// Query of `GET /api/GetFacturas`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub email: Option<String>,
}

/// Body of `POST /api/DeletePdf`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
    #[serde(default, rename = "fileUrl", alias = "file_url", alias = "url")]
    pub file_url: Option<String>,
}

/// Persist-mode answer of `POST /api/generar-pdf`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub url: String,
    pub pathname: String,
}

/// One row of the `GET /api/GetFacturas` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceListing {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "TIME")]
    pub time: String,
    #[serde(rename = "COST")]
    pub cost: String,
}

/// Answer of `POST /api/DeletePdf`.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}
