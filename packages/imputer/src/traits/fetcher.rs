//! Fetch trait - turning a URL into raw content with a status and cost.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FetchOpResult;
use crate::types::config::FetchConfig;

/// Which fetch variant to use. `Budget` is the cheaper configuration
/// the cost fallback switches to after spending crosses the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchTier {
    Full,
    Budget,
}

/// Per-call fetch options, derived from the run configuration.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub tier: FetchTier,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl FetchOptions {
    /// Full-tier options from a fetch config.
    pub fn full(config: &FetchConfig) -> Self {
        Self {
            tier: FetchTier::Full,
            poll_interval: config.poll_interval,
            poll_timeout: config.poll_timeout,
        }
    }

    /// Budget-tier options from a fetch config.
    pub fn budget(config: &FetchConfig) -> Self {
        Self {
            tier: FetchTier::Budget,
            poll_interval: config.budget.poll_interval,
            poll_timeout: config.budget.poll_timeout,
        }
    }
}

/// Raw fetched content: markup as text, or structured data when the
/// backend returns parsed records directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPayload {
    Html(String),
    Structured(Value),
}

impl FetchPayload {
    /// Content size used against the minimum-size floor. HTML counts
    /// characters; structured data counts its serialized length.
    pub fn size(&self) -> usize {
        match self {
            FetchPayload::Html(html) => html.len(),
            FetchPayload::Structured(value) => {
                serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
            }
        }
    }
}

/// Backend-reported fetch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Ready,
    Failed,
    Timeout,
    Error,
}

/// Outcome of one fetch call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub url: String,
    pub status: FetchStatus,
    pub data: Option<FetchPayload>,
    pub cost: f64,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl FetchResult {
    /// A successful fetch carrying content.
    pub fn ready(url: impl Into<String>, data: FetchPayload) -> Self {
        Self {
            url: url.into(),
            status: FetchStatus::Ready,
            data: Some(data),
            cost: 0.0,
            elapsed: Duration::ZERO,
            error: None,
        }
    }

    /// A failed fetch with an error message.
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: FetchStatus::Failed,
            data: None,
            cost: 0.0,
            elapsed: Duration::ZERO,
            error: Some(error.into()),
        }
    }

    /// A fetch that exceeded its poll timeout.
    pub fn timed_out(url: impl Into<String>, timeout: Duration) -> Self {
        let url = url.into();
        Self {
            error: Some(format!("fetch timed out after {timeout:?}")),
            status: FetchStatus::Timeout,
            data: None,
            cost: 0.0,
            elapsed: timeout,
            url,
        }
    }

    /// A fetch that errored before producing a status.
    pub fn errored(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: FetchStatus::Error,
            data: None,
            cost: 0.0,
            elapsed: Duration::ZERO,
            error: Some(error.into()),
        }
    }

    /// Set the cost.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Set the elapsed time.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Whether the backend delivered usable content.
    pub fn is_ready(&self) -> bool {
        self.status == FetchStatus::Ready && self.data.is_some()
    }

    /// Content size, zero when there is no payload.
    pub fn content_size(&self) -> usize {
        self.data.as_ref().map(FetchPayload::size).unwrap_or(0)
    }

    /// Demote a backend-success result to `Failed`. Applied when the
    /// content is below the configured size floor ("too small is an
    /// error page").
    pub fn demote_undersized(mut self, min: usize) -> Self {
        let size = self.content_size();
        self.status = FetchStatus::Failed;
        self.error = Some(format!("content below minimum size: {size} < {min}"));
        self
    }
}

/// Fetch capability: retrieve raw content from one URL.
///
/// Errors are per-URL: the coordinator converts an `Err` into a failed
/// `FetchResult` and moves on; sibling fetches are never aborted.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a single URL under the given options.
    async fn fetch(&self, url: &str, opts: &FetchOptions) -> FetchOpResult<FetchResult>;
}
