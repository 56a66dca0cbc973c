//! HTTP-based fetch implementation.
//!
//! Plain GET fetching suitable for static pages. JavaScript-heavy or
//! bot-walled sites need a rendering backend behind the same trait.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchOpResult};
use crate::traits::fetcher::{FetchOptions, FetchPayload, FetchResult, Fetcher};

/// Fetcher that issues a plain HTTP GET per URL.
///
/// The budget tier uses the shorter timeouts from `FetchOptions` but is
/// otherwise identical; cheaper rendering backends can interpret the
/// tier more aggressively.
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
    /// Flat cost attributed to each fetch, for run accounting.
    pub cost_per_fetch: f64,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    /// Create a new HTTP fetcher with default settings.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            user_agent: "ImputerBot/1.0".to_string(),
            cost_per_fetch: 0.0,
        }
    }

    /// Set a custom user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Set the per-fetch cost used for accounting.
    pub fn with_cost_per_fetch(mut self, cost: f64) -> Self {
        self.cost_per_fetch = cost;
        self
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, opts: &FetchOptions) -> FetchOpResult<FetchResult> {
        if url::Url::parse(url).is_err() {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
            });
        }

        debug!(url = %url, tier = ?opts.tier, "HTTP fetch starting");
        let start = Instant::now();

        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .timeout(opts.poll_timeout)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Ok(FetchResult::timed_out(url, opts.poll_timeout)
                    .with_cost(self.cost_per_fetch))
            }
            Err(e) => {
                warn!(url = %url, error = %e, "HTTP request failed");
                return Err(FetchError::Http(Box::new(e)));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(FetchResult::failed(url, format!("HTTP {status}"))
                .with_cost(self.cost_per_fetch)
                .with_elapsed(start.elapsed()));
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                return Ok(FetchResult::errored(url, format!("body read failed: {e}"))
                    .with_cost(self.cost_per_fetch)
                    .with_elapsed(start.elapsed()))
            }
        };

        Ok(FetchResult::ready(url, FetchPayload::Html(body))
            .with_cost(self.cost_per_fetch)
            .with_elapsed(start.elapsed()))
    }
}
