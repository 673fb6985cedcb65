//! Storage key scheme.
//!
//! ```text
//! factura-<owner>-<total>-<token>.pdf
//!         └─ owner ─┘ └2dp ┘ └32 hex┘
//! ```
//!
//! The owner segment scopes listing by prefix, the total is recoverable for
//! listings without opening the PDF, and the random token makes every key
//! unique so two invoices with the same owner and total never collide.
//!
//! Keys written before the token was introduced (`factura-<owner>-<total>.pdf`)
//! still parse.

use crate::order::format_amount;
use bigdecimal::{BigDecimal, Zero};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const KEY_PREFIX: &str = "factura-";
pub const KEY_SUFFIX: &str = ".pdf";

/// What follows `factura-<owner>-`, minus `.pdf`: a cost with no `-`, then
/// an optional 32-hex token.
static RE_REMAINDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<cost>[^-]*)(?:-(?P<token>[0-9a-f]{32}))?$").unwrap());

/// An object key produced by [`StoredInvoiceKey::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredInvoiceKey(String);

impl StoredInvoiceKey {
    /// Fresh key for `owner` with `total` encoded at two decimals.
    pub fn generate(owner: &str, total: &BigDecimal) -> Self {
        StoredInvoiceKey(format!(
            "{KEY_PREFIX}{owner}-{}-{}{KEY_SUFFIX}",
            format_amount(total),
            Uuid::new_v4().simple()
        ))
    }

    /// Listing prefix shared by every key of `owner`.
    pub fn owner_prefix(owner: &str) -> String {
        format!("{KEY_PREFIX}{owner}-")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StoredInvoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StoredInvoiceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Cost encoded in `pathname` if it is one of `owner`'s invoice keys.
///
/// Returns `None` for keys of other owners, including owners whose identity
/// merely starts with `owner` followed by `-`. A key that belongs to `owner`
/// but whose cost segment does not parse reports a cost of zero.
pub fn cost_for_owner(pathname: &str, owner: &str) -> Option<BigDecimal> {
    let rest = pathname.strip_prefix(&StoredInvoiceKey::owner_prefix(owner))?;
    let rest = rest.strip_suffix(KEY_SUFFIX).unwrap_or(rest);
    let caps = RE_REMAINDER.captures(rest)?;
    let cost = caps
        .name("cost")
        .and_then(|m| BigDecimal::from_str(m.as_str()).ok())
        .unwrap_or_else(BigDecimal::zero);
    Some(cost)
}
