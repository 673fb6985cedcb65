//! Hosted blob service over its REST API.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | put    | `PUT {api}/?pathname=<key>` with the raw bytes |
//! | list   | `GET {api}?prefix=<p>&cursor=<c>&limit=1000`, followed while `hasMore` |
//! | delete | list by pathname, then `POST {api}/delete` with `{"urls": [<url>]}` |
//!
//! Every request carries `Authorization: Bearer <token>`. Without a token the
//! store cannot be constructed and callers report "storage not configured".

use crate::error::InvoiceError;
use crate::store::{pathname_of, BlobObject, ObjectStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://blob.vercel-storage.com";
const API_VERSION: &str = "7";
const LIST_PAGE_SIZE: &str = "1000";

#[derive(Debug, Deserialize)]
struct PutResponse {
    url: String,
    pathname: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedBlob {
    url: String,
    pathname: String,
    uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    blobs: Vec<ListedBlob>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

/// Client for a token-authenticated blob REST API.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl HttpBlobStore {
    /// Build a client for `api_url`.
    ///
    /// Fails with [`InvoiceError::StorageNotConfigured`] when `token` is
    /// absent or blank.
    pub fn new(
        api_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, InvoiceError> {
        let token = token
            .filter(|t| !t.trim().is_empty())
            .ok_or(InvoiceError::StorageNotConfigured)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InvoiceError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn check(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, InvoiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(InvoiceError::storage(
            operation,
            format!("HTTP {status}: {}", body.trim()),
        ))
    }
}

#[async_trait]
impl ObjectStore for HttpBlobStore {
    async fn put(
        &self,
        pathname: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<BlobObject, InvoiceError> {
        let response = self
            .client
            .put(format!("{}/", self.api_url))
            .query(&[("pathname", pathname)])
            .header(AUTHORIZATION, self.bearer())
            .header("x-api-version", API_VERSION)
            .header("x-content-type", content_type)
            .header("x-add-random-suffix", "0")
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| InvoiceError::storage("put", e))?;
        let created: PutResponse = Self::check("put", response)
            .await?
            .json()
            .await
            .map_err(|e| InvoiceError::storage("put", e))?;
        debug!("Blob stored at {}", created.url);

        Ok(BlobObject {
            url: created.url,
            pathname: created.pathname,
            uploaded_at: Utc::now(),
        })
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<BlobObject>, InvoiceError> {
        let mut objects = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = vec![("limit", LIST_PAGE_SIZE)];
            if let Some(prefix) = prefix {
                query.push(("prefix", prefix));
            }
            if let Some(cursor) = cursor.as_deref() {
                query.push(("cursor", cursor));
            }

            let response = self
                .client
                .get(&self.api_url)
                .query(&query)
                .header(AUTHORIZATION, self.bearer())
                .header("x-api-version", API_VERSION)
                .send()
                .await
                .map_err(|e| InvoiceError::storage("list", e))?;
            let page: ListResponse = Self::check("list", response)
                .await?
                .json()
                .await
                .map_err(|e| InvoiceError::storage("list", e))?;

            objects.extend(page.blobs.into_iter().map(|b| BlobObject {
                url: b.url,
                pathname: b.pathname,
                uploaded_at: b.uploaded_at,
            }));

            match page.cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn get(&self, pathname: &str) -> Result<Vec<u8>, InvoiceError> {
        let object = self
            .list(Some(pathname))
            .await?
            .into_iter()
            .find(|o| o.pathname == pathname)
            .ok_or_else(|| InvoiceError::InvoiceNotFound {
                locator: pathname.to_string(),
            })?;

        let response = self
            .client
            .get(&object.url)
            .send()
            .await
            .map_err(|e| InvoiceError::storage("get", e))?;
        let bytes = Self::check("get", response)
            .await?
            .bytes()
            .await
            .map_err(|e| InvoiceError::storage("get", e))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, locator: &str) -> Result<(), InvoiceError> {
        // The delete endpoint answers 200 for unknown URLs, so resolve first.
        let pathname = pathname_of(locator);
        let object = self
            .list(Some(pathname))
            .await?
            .into_iter()
            .find(|o| o.pathname == pathname)
            .ok_or_else(|| InvoiceError::InvoiceNotFound {
                locator: locator.to_string(),
            })?;

        let response = self
            .client
            .post(format!("{}/delete", self.api_url))
            .header(AUTHORIZATION, self.bearer())
            .header("x-api-version", API_VERSION)
            .json(&serde_json::json!({ "urls": [object.url] }))
            .send()
            .await
            .map_err(|e| InvoiceError::storage("delete", e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(InvoiceError::InvoiceNotFound {
                locator: locator.to_string(),
            });
        }
        Self::check("delete", response).await?;
        debug!("Blob deleted at {}", object.url);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "blob"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorded {
        deleted: Vec<String>,
        auth: Vec<String>,
    }

    type Shared = Arc<Mutex<Recorded>>;

    const CATALOGUE: [(&str, &str); 2] = [
        ("factura-a-1.00.pdf", "2026-03-01T10:00:00.000Z"),
        ("factura-a-2.00.pdf", "2026-03-02T10:00:00.000Z"),
    ];

    fn blob_json(pathname: &str, uploaded_at: &str) -> serde_json::Value {
        serde_json::json!({
            "url": format!("https://cdn.test/{pathname}"),
            "pathname": pathname,
            "size": 10,
            "uploadedAt": uploaded_at
        })
    }

    /// One blob per page, filtered by prefix.
    async fn list_handler(
        State(rec): State<Shared>,
        headers: HeaderMap,
        Query(q): Query<HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        rec.lock().unwrap().auth.push(auth);

        let prefix = q.get("prefix").cloned().unwrap_or_default();
        let matching: Vec<_> = CATALOGUE
            .iter()
            .filter(|(pathname, _)| pathname.starts_with(&prefix))
            .collect();
        let page: usize = q
            .get("cursor")
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        let blobs: Vec<_> = matching
            .get(page)
            .map(|(pathname, at)| blob_json(pathname, at))
            .into_iter()
            .collect();
        let has_more = page + 1 < matching.len();
        Json(serde_json::json!({
            "blobs": blobs,
            "cursor": has_more.then(|| (page + 1).to_string()),
            "hasMore": has_more
        }))
    }

    async fn delete_handler(
        State(rec): State<Shared>,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        let url = body["urls"][0].as_str().unwrap_or_default().to_string();
        rec.lock().unwrap().deleted.push(url);
        StatusCode::OK
    }

    async fn spawn_api() -> (String, Shared) {
        let rec: Shared = Arc::default();
        let app = Router::new()
            .route("/", get(list_handler))
            .route("/delete", post(delete_handler))
            .with_state(rec.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), rec)
    }

    #[test]
    fn missing_token_is_not_configured() {
        let err = HttpBlobStore::new(DEFAULT_API_URL, None, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, InvoiceError::StorageNotConfigured));
        let err = HttpBlobStore::new(DEFAULT_API_URL, Some("  ".into()), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, InvoiceError::StorageNotConfigured));
    }

    #[tokio::test]
    async fn list_follows_cursor() {
        let (api, rec) = spawn_api().await;
        let store = HttpBlobStore::new(api, Some("tok".into()), Duration::from_secs(5)).unwrap();

        let objects = store.list(Some("factura-a-")).await.unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].pathname, "factura-a-1.00.pdf");
        assert_eq!(objects[1].pathname, "factura-a-2.00.pdf");

        let rec = rec.lock().unwrap();
        assert_eq!(rec.auth, vec!["Bearer tok", "Bearer tok"]);
    }

    #[tokio::test]
    async fn delete_posts_locator() {
        let (api, rec) = spawn_api().await;
        let store = HttpBlobStore::new(api, Some("tok".into()), Duration::from_secs(5)).unwrap();

        store
            .delete("https://cdn.test/factura-a-1.00.pdf")
            .await
            .unwrap();
        assert_eq!(
            rec.lock().unwrap().deleted,
            vec!["https://cdn.test/factura-a-1.00.pdf"]
        );
    }

    #[tokio::test]
    async fn delete_of_unknown_locator_is_not_found() {
        let (api, rec) = spawn_api().await;
        let store = HttpBlobStore::new(api, Some("tok".into()), Duration::from_secs(5)).unwrap();

        let err = store
            .delete("https://cdn.test/factura-a-9.00.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceError::InvoiceNotFound { .. }));
        assert!(rec.lock().unwrap().deleted.is_empty());
    }
}
