//! In-process object store.

use crate::error::InvoiceError;
use crate::store::{pathname_of, validate_pathname, BlobObject, ObjectStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct Entry {
    bytes: Vec<u8>,
    uploaded_at: DateTime<Utc>,
}

/// Objects kept in a map; gone when the process exits.
///
/// URLs are `<base_url>/<pathname>`. Point `base_url` at the server's
/// `/invoices` route to make them dereferenceable.
pub struct MemoryObjectStore {
    base_url: String,
    objects: RwLock<BTreeMap<String, Entry>>,
    clock: Clock,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_clock(base_url, Utc::now)
    }

    /// Use `clock` for upload timestamps instead of the wall clock.
    pub fn with_clock(
        base_url: impl Into<String>,
        clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(BTreeMap::new()),
            clock: Box::new(clock),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn url_for(&self, pathname: &str) -> String {
        format!("{}/{}", self.base_url, pathname)
    }
}

fn poisoned(operation: &'static str) -> InvoiceError {
    InvoiceError::storage(operation, "memory store lock poisoned")
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        pathname: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<BlobObject, InvoiceError> {
        validate_pathname(pathname)?;
        let uploaded_at = (self.clock)();
        self.objects
            .write()
            .map_err(|_| poisoned("put"))?
            .insert(pathname.to_string(), Entry { bytes, uploaded_at });
        Ok(BlobObject {
            url: self.url_for(pathname),
            pathname: pathname.to_string(),
            uploaded_at,
        })
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<BlobObject>, InvoiceError> {
        let objects = self.objects.read().map_err(|_| poisoned("list"))?;
        let prefix = prefix.unwrap_or_default();
        Ok(objects
            .iter()
            .filter(|(pathname, _)| pathname.starts_with(prefix))
            .map(|(pathname, entry)| BlobObject {
                url: self.url_for(pathname),
                pathname: pathname.clone(),
                uploaded_at: entry.uploaded_at,
            })
            .collect())
    }

    async fn get(&self, pathname: &str) -> Result<Vec<u8>, InvoiceError> {
        let objects = self.objects.read().map_err(|_| poisoned("get"))?;
        objects
            .get(pathname)
            .map(|entry| entry.bytes.clone())
            .ok_or_else(|| InvoiceError::InvoiceNotFound {
                locator: pathname.to_string(),
            })
    }

    async fn delete(&self, locator: &str) -> Result<(), InvoiceError> {
        let pathname = pathname_of(locator);
        let removed = self
            .objects
            .write()
            .map_err(|_| poisoned("delete"))?
            .remove(pathname);
        match removed {
            Some(_) => Ok(()),
            None => Err(InvoiceError::InvoiceNotFound {
                locator: locator.to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn put_list_get_delete() {
        let store = MemoryObjectStore::new("http://localhost:3000/invoices/");
        let object = store
            .put("factura-a-1.00.pdf", b"%PDF".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert_eq!(object.url, "http://localhost:3000/invoices/factura-a-1.00.pdf");

        store
            .put("factura-b-2.00.pdf", b"%PDF".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert_eq!(store.list(None).await.unwrap().len(), 2);
        assert_eq!(store.list(Some("factura-a-")).await.unwrap().len(), 1);
        assert_eq!(store.get("factura-a-1.00.pdf").await.unwrap(), b"%PDF");

        store.delete(&object.url).await.unwrap();
        assert_eq!(store.len(), 1);
        store.delete("factura-b-2.00.pdf").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn deleting_missing_object_is_not_found() {
        let store = MemoryObjectStore::new("memory://");
        let err = store.delete("nope.pdf").await.unwrap_err();
        assert!(matches!(err, InvoiceError::InvoiceNotFound { .. }));
    }

    #[tokio::test]
    async fn injected_clock_stamps_uploads() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let store = MemoryObjectStore::with_clock("memory://", move || at);
        let object = store.put("x.pdf", vec![], "application/pdf").await.unwrap();
        assert_eq!(object.uploaded_at, at);
    }
}
