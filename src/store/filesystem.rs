//! Directory-backed object store.

use crate::error::InvoiceError;
use crate::store::{pathname_of, validate_pathname, BlobObject, ObjectStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// One file per object under `root`; the upload time is the file's mtime.
///
/// Writes go to a hidden temp file first and are renamed into place, so a
/// listing never sees a half-written PDF.
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
    base_url: String,
}

impl FsObjectStore {
    pub async fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Result<Self, InvoiceError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            InvoiceError::storage(
                "init",
                format!("failed to create {}: {e}", root.display()),
            )
        })?;
        Ok(Self {
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, pathname: &str) -> String {
        format!("{}/{}", self.base_url, pathname)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(
        &self,
        pathname: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<BlobObject, InvoiceError> {
        validate_pathname(pathname)?;
        let path = self.root.join(pathname);
        let tmp = self.root.join(format!(".{pathname}.tmp"));

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| InvoiceError::storage("put", format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| InvoiceError::storage("put", format!("rename to {}: {e}", path.display())))?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());

        Ok(BlobObject {
            url: self.url_for(pathname),
            pathname: pathname.to_string(),
            uploaded_at: Utc::now(),
        })
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<BlobObject>, InvoiceError> {
        let prefix = prefix.unwrap_or_default();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| InvoiceError::storage("list", e))?;

        let mut objects = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| InvoiceError::storage("list", e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || !name.starts_with(prefix) {
                continue;
            }
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| InvoiceError::storage("list", e))?;
            if !metadata.is_file() {
                continue;
            }
            let uploaded_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .map_err(|e| InvoiceError::storage("list", e))?;
            objects.push(BlobObject {
                url: self.url_for(&name),
                pathname: name,
                uploaded_at,
            });
        }
        Ok(objects)
    }

    async fn get(&self, pathname: &str) -> Result<Vec<u8>, InvoiceError> {
        if validate_pathname(pathname).is_err() {
            return Err(InvoiceError::InvoiceNotFound {
                locator: pathname.to_string(),
            });
        }
        match tokio::fs::read(self.root.join(pathname)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(InvoiceError::InvoiceNotFound {
                locator: pathname.to_string(),
            }),
            Err(e) => Err(InvoiceError::storage("get", e)),
        }
    }

    async fn delete(&self, locator: &str) -> Result<(), InvoiceError> {
        let pathname = pathname_of(locator);
        let not_found = || InvoiceError::InvoiceNotFound {
            locator: locator.to_string(),
        };
        if validate_pathname(pathname).is_err() {
            return Err(not_found());
        }
        match tokio::fs::remove_file(self.root.join(pathname)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(InvoiceError::storage("delete", e)),
        }
    }

    fn name(&self) -> &'static str {
        "fs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn round_trip_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path(), "http://localhost:3000/invoices")
            .await
            .unwrap();

        let object = store
            .put("factura-a-1.00.pdf", b"%PDF-1.5".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert_eq!(object.url, "http://localhost:3000/invoices/factura-a-1.00.pdf");
        assert!(dir.path().join("factura-a-1.00.pdf").exists());

        let listed = store.list(Some("factura-a-")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].pathname, "factura-a-1.00.pdf");
        assert!(store.list(Some("factura-b-")).await.unwrap().is_empty());

        assert_eq!(store.get("factura-a-1.00.pdf").await.unwrap(), b"%PDF-1.5");

        store.delete(&object.url).await.unwrap();
        assert!(!dir.path().join("factura-a-1.00.pdf").exists());
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path(), "http://x").await.unwrap();
        assert!(store.put("../escape.pdf", vec![], "application/pdf").await.is_err());
        assert!(matches!(
            store.get("../escape.pdf").await,
            Err(InvoiceError::InvoiceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path(), "http://x").await.unwrap();
        assert!(matches!(
            store.delete("http://x/factura-z-0.00.pdf").await,
            Err(InvoiceError::InvoiceNotFound { .. })
        ));
    }
}
