use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::error::StoreError;
use crate::storage::ObjectStore;

/// Where an image reference points. Anything that is neither an
/// `s3://bucket/key` locator nor an absolute http(s) URL is unsupported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference<'a> {
    Object { bucket: &'a str, key: &'a str },
    Http(Url),
    Unsupported,
}

impl<'a> ImageReference<'a> {
    pub fn parse(raw: &'a str) -> Self {
        if let Some(rest) = raw.strip_prefix("s3://") {
            return match rest.split_once('/') {
                Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                    ImageReference::Object { bucket, key }
                }
                _ => ImageReference::Unsupported,
            };
        }
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => ImageReference::Http(url),
            _ => ImageReference::Unsupported,
        }
    }
}

#[derive(Debug, Error)]
enum FetchError {
    #[error("unsupported image reference")]
    Unsupported,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http status {0}")]
    Status(u16),
}

/// Turns image references into bytes. Every failure, including a fetch
/// exceeding `fetch_timeout`, degrades to `None` and is logged.
#[derive(Clone)]
pub struct ImageResolver {
    store: Arc<dyn ObjectStore>,
    http: reqwest::Client,
    fetch_timeout: Duration,
}

impl ImageResolver {
    pub fn new(store: Arc<dyn ObjectStore>, http: reqwest::Client, fetch_timeout: Duration) -> Self {
        Self {
            store,
            http,
            fetch_timeout,
        }
    }

    pub async fn resolve(&self, reference: &str) -> Option<Bytes> {
        let fetch = self.fetch(ImageReference::parse(reference));
        match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(data)) => {
                debug!(reference, bytes = data.len(), "image resolved");
                Some(data)
            }
            Ok(Err(err)) => {
                warn!(reference, error = %err, "failed to fetch image");
                None
            }
            Err(_) => {
                warn!(
                    reference,
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "image fetch timed out"
                );
                None
            }
        }
    }

    async fn fetch(&self, source: ImageReference<'_>) -> Result<Bytes, FetchError> {
        match source {
            ImageReference::Object { bucket, key } => {
                Ok(self.store.get_object(bucket, key).await?)
            }
            ImageReference::Http(url) => {
                let response = self.http.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status(status.as_u16()));
                }
                Ok(response.bytes().await?)
            }
            ImageReference::Unsupported => Err(FetchError::Unsupported),
        }
    }
}
