//! Product image retrieval: image reference → [`RasterImage`].
//!
//! A failed fetch never fails the invoice. Every failure mode (bad URL,
//! timeout, non-2xx status, unsupported content type, oversized body,
//! undecodable bytes)
//! surfaces as a [`ThumbnailError`] and the layout pass leaves that row's
//! image cell blank.

use crate::config::InvoiceConfig;
use crate::error::{InvoiceError, ThumbnailError};
use crate::order::LineItem;
use crate::pipeline::normalize::{normalize_bytes, ImageEncoding, RasterImage};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

/// Largest image body read before the fetch is abandoned.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Result of resolving one item's image.
///
/// `None` when the item has no image reference (no fetch is attempted).
pub type ThumbnailSlot = Option<Result<RasterImage, ThumbnailError>>;

/// Check if the reference looks like an absolute HTTP(S) URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Fetches and normalises product images with a bounded timeout.
///
/// Cheap to clone: the underlying `reqwest::Client` shares its connection pool.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
    max_px: u32,
    max_bytes: usize,
}

impl ImageFetcher {
    pub fn new(config: &InvoiceConfig) -> Result<Self, InvoiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.image_timeout())
            .build()
            .map_err(|e| InvoiceError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout_secs: config.image_timeout_secs,
            max_px: config.thumbnail_max_px,
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        })
    }

    /// Override the per-image body limit.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes.max(1);
        self
    }

    /// Fetch `url` and decode it into an embeddable raster.
    pub async fn normalize(&self, url: &str) -> Result<RasterImage, ThumbnailError> {
        let (encoding, bytes) = self.download(url).await?;
        let max_px = self.max_px;

        tokio::task::spawn_blocking(move || normalize_bytes(&bytes, encoding, max_px))
            .await
            .map_err(|e| ThumbnailError::DecodeFailed {
                url: url.to_string(),
                detail: format!("decoder task panicked: {e}"),
            })?
            .map_err(|e| ThumbnailError::DecodeFailed {
                url: url.to_string(),
                detail: e.to_string(),
            })
    }

    /// Resolve every item's image, at most `concurrency` at a time.
    ///
    /// The returned slots are in item order regardless of completion order.
    pub async fn normalize_all(
        &self,
        items: &[LineItem],
        concurrency: usize,
    ) -> Vec<ThumbnailSlot> {
        let jobs: Vec<(String, Option<String>)> = items
            .iter()
            .map(|item| (item.name.clone(), item.image_ref.clone()))
            .collect();

        stream::iter(jobs)
            .map(|(name, url)| self.resolve(name, url))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn resolve(&self, name: String, url: Option<String>) -> ThumbnailSlot {
        let url = url?;
        let result = self.normalize(&url).await;
        if let Err(ref e) = result {
            warn!("Thumbnail for '{}' skipped: {}", name, e);
        }
        Some(result)
    }

    async fn download(&self, url: &str) -> Result<(ImageEncoding, Vec<u8>), ThumbnailError> {
        if !is_url(url) || reqwest::Url::parse(url).is_err() {
            return Err(ThumbnailError::InvalidUrl {
                url: url.to_string(),
            });
        }
        debug!("Fetching image: {}", url);

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ThumbnailError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let encoding = ImageEncoding::from_content_type(&content_type).ok_or_else(|| {
            ThumbnailError::UnsupportedType {
                url: url.to_string(),
                content_type: content_type.clone(),
            }
        })?;

        let too_large = || ThumbnailError::TooLarge {
            url: url.to_string(),
            limit: self.max_bytes,
        };
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(too_large());
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.transport_error(url, e))?
        {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }
        debug!("Fetched {} bytes ({}) from {}", bytes.len(), content_type, url);
        Ok((encoding, bytes))
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> ThumbnailError {
        if e.is_timeout() {
            ThumbnailError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            ThumbnailError::FetchFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}
