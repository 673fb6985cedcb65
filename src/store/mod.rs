//! Invoice persistence on a pluggable object store.
//!
//! [`ObjectStore`] is the narrow contract a blob backend has to satisfy
//! (put / list-by-prefix / get / delete). [`InvoiceStore`] layers the invoice
//! key scheme from [`key`] on top of it: key allocation, per-owner listing
//! newest-first with the cost recovered from the key, and deletion by
//! locator.
//!
//! Three backends ship with the crate:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`MemoryObjectStore`] | tests and throw-away local runs |
//! | [`FsObjectStore`]     | single-host deployments; objects are served by the HTTP layer |
//! | [`HttpBlobStore`]     | a hosted blob service (token-authenticated REST API) |

pub mod blob;
pub mod filesystem;
pub mod key;
pub mod memory;

pub use blob::HttpBlobStore;
pub use filesystem::FsObjectStore;
pub use key::StoredInvoiceKey;
pub use memory::MemoryObjectStore;

use crate::error::InvoiceError;
use crate::pipeline::layout::InvoiceDocument;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// One object as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobObject {
    /// Publicly dereferenceable locator.
    pub url: String,
    /// Key the object was stored under.
    pub pathname: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Minimal blob storage contract.
///
/// Objects written through `put` are publicly readable at the returned URL.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under exactly `pathname` (no random suffix).
    async fn put(
        &self,
        pathname: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<BlobObject, InvoiceError>;

    /// Every object whose pathname starts with `prefix` (all objects for `None`).
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<BlobObject>, InvoiceError>;

    /// Read the object stored under `pathname`.
    async fn get(&self, pathname: &str) -> Result<Vec<u8>, InvoiceError>;

    /// Remove the object addressed by `locator` (its URL or its pathname).
    ///
    /// `locator` arrives already percent-decoded.
    async fn delete(&self, locator: &str) -> Result<(), InvoiceError>;

    /// Short backend label for logs.
    fn name(&self) -> &'static str;
}

/// Result of persisting one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredInvoice {
    pub key: String,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// One entry of an owner's invoice listing.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceSummary {
    pub url: String,
    pub pathname: String,
    pub created_at: DateTime<Utc>,
    pub cost: BigDecimal,
}

/// Invoice-aware facade over an [`ObjectStore`].
#[derive(Clone)]
pub struct InvoiceStore {
    backend: Arc<dyn ObjectStore>,
}

impl fmt::Debug for InvoiceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvoiceStore")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl InvoiceStore {
    pub fn new(backend: Arc<dyn ObjectStore>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Reserve a fresh key. The key is what the invoice's QR code encodes,
    /// so it must exist before the document is rendered.
    pub fn allocate_key(&self, owner: &str, total: &BigDecimal) -> StoredInvoiceKey {
        StoredInvoiceKey::generate(owner, total)
    }

    /// Upload `document` under a previously allocated `key`.
    pub async fn put(
        &self,
        key: &StoredInvoiceKey,
        document: &InvoiceDocument,
    ) -> Result<StoredInvoice, InvoiceError> {
        let object = self
            .backend
            .put(key.as_str(), document.as_bytes().to_vec(), PDF_CONTENT_TYPE)
            .await?;
        info!(
            key = %key,
            bytes = document.len(),
            backend = self.backend.name(),
            "Stored invoice"
        );
        Ok(StoredInvoice {
            key: object.pathname,
            url: object.url,
            uploaded_at: object.uploaded_at,
        })
    }

    /// Every invoice of `owner`, newest first.
    ///
    /// Objects under the owner's prefix that are not invoice keys of that
    /// exact owner are left out.
    pub async fn list(&self, owner: &str) -> Result<Vec<InvoiceSummary>, InvoiceError> {
        let prefix = StoredInvoiceKey::owner_prefix(owner);
        let objects = self.backend.list(Some(&prefix)).await?;
        let listed = objects.len();

        let mut invoices: Vec<InvoiceSummary> = objects
            .into_iter()
            .filter_map(|object| {
                let cost = key::cost_for_owner(&object.pathname, owner)?;
                Some(InvoiceSummary {
                    url: object.url,
                    pathname: object.pathname,
                    created_at: object.uploaded_at,
                    cost,
                })
            })
            .collect();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        debug!(
            "Listed {} invoices for '{}' ({} objects under prefix)",
            invoices.len(),
            owner,
            listed
        );
        Ok(invoices)
    }

    /// Delete the invoice addressed by `locator`.
    ///
    /// The locator is percent-decoded exactly once before it reaches the
    /// backend, so both raw and URL-encoded forms address the same object.
    pub async fn delete(&self, locator: &str) -> Result<(), InvoiceError> {
        let decoded = decode_locator(locator);
        self.backend.delete(&decoded).await?;
        info!(locator = %decoded, backend = self.backend.name(), "Deleted invoice");
        Ok(())
    }

    /// Read back a stored invoice by key.
    pub async fn fetch(&self, pathname: &str) -> Result<Vec<u8>, InvoiceError> {
        self.backend.get(pathname).await
    }
}

/// Percent-decode `locator` once; malformed escapes leave it untouched.
pub fn decode_locator(locator: &str) -> Cow<'_, str> {
    urlencoding::decode(locator).unwrap_or(Cow::Borrowed(locator))
}

/// Last path segment of `locator`, with any query string or fragment removed.
pub(crate) fn pathname_of(locator: &str) -> &str {
    let end = locator.find(['?', '#']).unwrap_or(locator.len());
    let path = &locator[..end];
    path.rsplit('/').next().unwrap_or(path)
}

/// Pathnames a backend can store as a single flat object.
pub(crate) fn validate_pathname(pathname: &str) -> Result<(), InvoiceError> {
    let bad = pathname.is_empty()
        || pathname == "."
        || pathname == ".."
        || pathname.starts_with('.')
        || pathname.contains(['/', '\\', '\0']);
    if bad {
        return Err(InvoiceError::storage(
            "put",
            format!("invalid object name '{pathname}'"),
        ));
    }
    Ok(())
}
