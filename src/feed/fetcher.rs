use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::config::FeedConfig;
use crate::feed::FeedSource;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching one source.
///
/// None of these abort an ingestion run: the orchestrator logs them and
/// moves on to the next source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Search URL could not be built from the configured base URL
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Retrieves raw feed documents, one request per source.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl FeedFetcher {
    /// Build a fetcher with its own HTTP client carrying the configured
    /// `User-Agent` (reddit rejects requests without one).
    pub fn new(config: &FeedConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Build a fetcher around an existing client (allows custom configuration).
    pub fn with_client(client: reqwest::Client, config: &FeedConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Full search URL for a source, newest first, limited to `quota` entries.
    pub fn search_url(
        &self,
        source: &FeedSource,
        query: &str,
        quota: usize,
    ) -> Result<url::Url, FetchError> {
        let limit = quota.to_string();
        url::Url::parse_with_params(
            &format!("{}{}", self.base_url, source.search_path),
            &[
                ("q", query),
                ("restrict_sr", "on"),
                ("sort", "new"),
                ("limit", limit.as_str()),
            ],
        )
        .map_err(|e| FetchError::InvalidUrl(e.to_string()))
    }

    /// Fetch the raw feed document for one source.
    ///
    /// # Behavior
    ///
    /// - Each request is bounded by the configured timeout
    /// - Rate limiting (HTTP 429) and 5xx responses back off exponentially
    ///   and retry up to `max_retries` times
    /// - Other non-2xx statuses fail immediately
    /// - Response bodies are limited to 10MB to prevent memory exhaustion
    pub async fn fetch(
        &self,
        source: &FeedSource,
        query: &str,
        quota: usize,
    ) -> Result<Vec<u8>, FetchError> {
        let url = self.search_url(source, query, quota)?;
        let mut retry_count = 0;

        loop {
            let response = tokio::time::timeout(self.timeout, self.client.get(url.clone()).send())
                .await
                .map_err(|_| FetchError::Timeout(self.timeout))?
                .map_err(FetchError::Network)?;

            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if retry_count >= self.max_retries {
                    return Err(FetchError::RateLimited(self.max_retries));
                }
                let delay = self.backoff(retry_count);
                tracing::warn!(
                    source = %source.name,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if status.is_server_error() {
                if retry_count >= self.max_retries {
                    return Err(FetchError::HttpStatus(status.as_u16()));
                }
                let delay = self.backoff(retry_count);
                tracing::warn!(
                    source = %source.name,
                    status = %status,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Server error, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            match read_limited_bytes(response, MAX_FEED_SIZE).await {
                Ok(bytes) => {
                    tracing::debug!(
                        source = %source.name,
                        bytes = bytes.len(),
                        quota = quota,
                        "Fetched feed"
                    );
                    return Ok(bytes);
                }
                Err(FetchError::IncompleteResponse { expected, received }) => {
                    if retry_count >= self.max_retries {
                        return Err(FetchError::IncompleteResponse { expected, received });
                    }
                    let delay = self.backoff(retry_count);
                    tracing::debug!(
                        source = %source.name,
                        expected = expected,
                        received = received,
                        attempt = retry_count + 1,
                        "Retrying incomplete download"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self, retry_count: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(retry_count))
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
