//! Image download with timeout and retry.
//!
//! The engine never talks HTTP directly; it goes through the [`ImageFetch`]
//! trait so tests can substitute an in-memory source.

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use lookalike_types::FetchSettings;

use crate::error::EmbeddingError;

/// Source of raw image bytes.
#[async_trait]
pub trait ImageFetch: Send + Sync {
    /// Fetch the encoded image at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, EmbeddingError>;
}

/// Failure classification for the retry loop.
enum FetchFailure {
    /// Worth retrying: transport errors, timeouts, 5xx, 429
    Transient(EmbeddingError),
    /// Not worth retrying: 4xx, oversized or empty bodies
    Fatal(EmbeddingError),
}

/// HTTP image fetcher with bounded retries.
pub struct HttpImageFetcher {
    client: Client,
    settings: FetchSettings,
}

impl HttpImageFetcher {
    /// Create a fetcher from settings.
    pub fn new(settings: FetchSettings) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Config(e.to_string()))?;

        Ok(Self { client, settings })
    }

    /// Single download attempt.
    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let response = self.client.get(url).send().await.map_err(|e| {
            FetchFailure::Transient(EmbeddingError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })
        })?;

        let status = response.status();
        if !status.is_success() {
            let err = EmbeddingError::Fetch {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            };
            if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(FetchFailure::Transient(err));
            }
            return Err(FetchFailure::Fatal(err));
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.settings.max_image_bytes {
                return Err(FetchFailure::Fatal(EmbeddingError::Fetch {
                    url: url.to_string(),
                    reason: format!(
                        "response of {len} bytes exceeds limit of {}",
                        self.settings.max_image_bytes
                    ),
                }));
            }
        }

        let bytes = response.bytes().await.map_err(|e| {
            FetchFailure::Transient(EmbeddingError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })
        })?;

        if bytes.is_empty() {
            return Err(FetchFailure::Fatal(EmbeddingError::InvalidInput(format!(
                "empty response body from {url}"
            ))));
        }
        if bytes.len() > self.settings.max_image_bytes {
            return Err(FetchFailure::Fatal(EmbeddingError::Fetch {
                url: url.to_string(),
                reason: format!(
                    "response of {} bytes exceeds limit of {}",
                    bytes.len(),
                    self.settings.max_image_bytes
                ),
            }));
        }

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageFetch for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, EmbeddingError> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, url, "Fetching image");

            match self.fetch_once(url).await {
                Ok(bytes) => {
                    debug!(url, size = bytes.len(), "Image fetched");
                    return Ok(bytes);
                }
                Err(FetchFailure::Fatal(e)) => return Err(e),
                Err(FetchFailure::Transient(e)) => {
                    if attempts >= self.settings.max_retries {
                        warn!(error = %e, url, "Max retries exceeded");
                        return Err(e);
                    }

                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                error = %e,
                                url,
                                retry_in_ms = duration.as_millis(),
                                "Image fetch failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => return Err(e),
                    }
                }
            }
        }
    }
}
