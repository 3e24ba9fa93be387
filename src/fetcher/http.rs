//! HTTP page fetcher
//!
//! Talks to a JSON page endpoint:
//!
//! ```text
//! GET <endpoint>?q=<search>&since=YYYY-MM-DD&until=YYYY-MM-DD[&cursor=<token>]
//! 200 {"records": [{"url": ..., "created_at": ..., "content": ...}, ...], "next_cursor": "..." | null}
//! ```
//!
//! Network errors, 429 and 5xx are retried with exponential backoff. Once retries are
//! exhausted the window ends with a transient reason. Any other 4xx halts the run.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Cursor, EndReason, FetchRequest, FetcherError, FetcherResult, PageFetcher, PageOutcome};
use crate::collector::config::{retry_delay, CollectorConfig};
use crate::Record;

/// Body of one page response
#[derive(Debug, Deserialize)]
struct PageBody {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    next_cursor: Option<String>,
}

impl PageBody {
    fn into_outcome(self) -> PageOutcome {
        let total = self.records.len();
        let records: Vec<Record> = self
            .records
            .into_iter()
            .filter(|record| match record.validate() {
                Ok(()) => true,
                Err(reason) => {
                    warn!(url = %record.url, %reason, "Dropping invalid record from page");
                    false
                }
            })
            .collect();

        debug!(
            received = total,
            kept = records.len(),
            has_next = self.next_cursor.is_some(),
            "Decoded page"
        );

        PageOutcome::Page {
            records,
            next: self.next_cursor.map(Cursor::token),
        }
    }
}

/// Failure of one request attempt
enum AttemptError {
    /// Worth another attempt
    Retryable(FetcherError),
    /// Client error other than 429
    Fatal(FetcherError),
}

/// [`PageFetcher`] for a JSON page endpoint
pub struct HttpPageFetcher {
    client: Client,
    endpoint: Url,
    max_retries: u32,
    backoff: fn(u32) -> Duration,
}

impl HttpPageFetcher {
    /// Create a fetcher for `endpoint`
    ///
    /// # Arguments
    /// * `endpoint` - Absolute http(s) URL of the page endpoint
    /// * `config` - Supplies the request timeout and retry count
    pub fn new(endpoint: &str, config: &CollectorConfig) -> FetcherResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| FetcherError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(FetcherError::InvalidEndpoint(format!(
                "unsupported scheme '{}'",
                endpoint.scheme()
            )));
        }

        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(concat!("timeline-harvester/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetcherError::HttpError(format!("Failed to build client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            max_retries: config.max_retries,
            backoff: retry_delay,
        })
    }

    /// Replace the retry delay schedule
    pub fn with_backoff(mut self, backoff: fn(u32) -> Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Endpoint URL
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    fn query_params(request: &FetchRequest, cursor: &Cursor) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", request.search.clone()),
            ("since", request.since.to_string()),
            ("until", request.until.to_string()),
        ];
        if let Some(token) = cursor.as_token() {
            params.push(("cursor", token.to_string()));
        }
        params
    }

    async fn attempt(&self, params: &[(&'static str, String)]) -> Result<PageBody, AttemptError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(params)
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(FetcherError::NetworkError(e.to_string())))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::Retryable(FetcherError::RateLimitExceeded));
        }
        if status.is_server_error() {
            return Err(AttemptError::Retryable(FetcherError::HttpError(format!(
                "Server error: {status}"
            ))));
        }
        if status.is_client_error() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AttemptError::Fatal(FetcherError::HttpError(format!(
                "Client error {status}: {error_text}"
            ))));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Retryable(FetcherError::NetworkError(e.to_string())))?;

        serde_json::from_slice::<PageBody>(&bytes).map_err(|e| {
            AttemptError::Fatal(FetcherError::ParseError(format!(
                "Failed to deserialize page: {e}"
            )))
        })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&mut self, request: &FetchRequest, cursor: &Cursor) -> PageOutcome {
        let params = Self::query_params(request, cursor);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match self.attempt(&params).await {
                Ok(body) => {
                    debug!(attempt = attempt + 1, cursor = %cursor, "Page request succeeded");
                    return body.into_outcome();
                }
                Err(AttemptError::Fatal(FetcherError::ParseError(reason))) => {
                    warn!(%reason, cursor = %cursor, "Undecodable page body");
                    return PageOutcome::End(EndReason::Transient(reason));
                }
                Err(AttemptError::Fatal(error)) => {
                    return PageOutcome::Fatal(error);
                }
                Err(AttemptError::Retryable(error)) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_retries + 1,
                        error = %error,
                        "Page request failed"
                    );
                    last_error = Some(error);

                    if attempt < self.max_retries {
                        let backoff = (self.backoff)(attempt);
                        debug!(backoff_ms = backoff.as_millis() as u64, "Retrying page request");
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "all retries exhausted".to_string());
        PageOutcome::End(EndReason::Transient(reason))
    }
}
