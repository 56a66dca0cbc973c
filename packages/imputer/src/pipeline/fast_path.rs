//! Fast-path decision service.
//!
//! Builds direct-access URLs for a small set of known-good domains and
//! fetches them before (or instead of) generic discovery. The pass is
//! successful when at least one fetch comes back ready with content at
//! or above the configured size floor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::traits::fetcher::{FetchOptions, FetchResult, FetchTier, Fetcher};
use crate::types::config::FastPathConfig;
use crate::types::entity::EntityToImpute;

/// What one fast-path pass produced.
#[derive(Debug, Clone)]
pub struct FastPathOutcome {
    /// Fetch result per direct URL, in domain configuration order
    pub results: IndexMap<String, FetchResult>,

    /// Wall-clock time of the whole pass
    pub duration: Duration,

    /// Total fetch spend of the pass
    pub cost: f64,

    /// Whether at least one result met the size floor
    pub satisfied: bool,
}

impl FastPathOutcome {
    fn empty() -> Self {
        Self {
            results: IndexMap::new(),
            duration: Duration::ZERO,
            cost: 0.0,
            satisfied: false,
        }
    }
}

/// Fetches configured direct URLs with its own concurrency pool,
/// independent of the main fetch gate.
pub struct FastPathService<'a, F: Fetcher> {
    fetcher: &'a F,
    config: &'a FastPathConfig,
}

impl<'a, F: Fetcher> FastPathService<'a, F> {
    /// Create a service over a fetcher and fast-path config.
    pub fn new(fetcher: &'a F, config: &'a FastPathConfig) -> Self {
        Self { fetcher, config }
    }

    /// Run the fast-path pass for an entity.
    pub async fn execute(&self, entity: &EntityToImpute) -> FastPathOutcome {
        let urls = self.config.urls_for(&entity.name);
        if urls.is_empty() {
            warn!("fast path enabled but no domains configured");
            return FastPathOutcome::empty();
        }

        info!(domains = urls.len(), entity = %entity.name, "executing fast path");
        let start = Instant::now();

        let opts = FetchOptions {
            tier: FetchTier::Full,
            poll_interval: self.config.poll_interval,
            poll_timeout: self.config.poll_timeout,
        };
        let gate = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        let mut fetches: FuturesUnordered<_> = urls
            .iter()
            .map(|(domain, url)| {
                self.fetch_domain(domain.clone(), url.clone(), Arc::clone(&gate), opts.clone())
            })
            .collect();

        let mut results = IndexMap::new();
        let mut cost = 0.0;
        while let Some((domain, url, result)) = fetches.next().await {
            cost += result.cost;
            if result.is_ready() {
                info!(
                    domain = %domain,
                    size = result.content_size(),
                    cost = result.cost,
                    "fast path fetch ready"
                );
            } else {
                warn!(domain = %domain, error = ?result.error, "fast path fetch failed");
            }
            results.insert(url, result);
        }
        drop(fetches);

        // Keep domain configuration order for deterministic output.
        results.sort_by(|url_a, _, url_b, _| {
            let pos = |u: &str| urls.values().position(|v| v == u);
            pos(url_a).cmp(&pos(url_b))
        });

        let satisfied = results
            .values()
            .any(|r| r.is_ready() && r.content_size() >= self.config.min_result_size);

        FastPathOutcome {
            results,
            duration: start.elapsed(),
            cost,
            satisfied,
        }
    }

    async fn fetch_domain(
        &self,
        domain: String,
        url: String,
        gate: Arc<Semaphore>,
        opts: FetchOptions,
    ) -> (String, String, FetchResult) {
        let _permit = gate.acquire_owned().await.expect("fast path gate closed");

        let result = match timeout(opts.poll_timeout, self.fetcher.fetch(&url, &opts)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => FetchResult::errored(url.as_str(), e.to_string()),
            Err(_) => FetchResult::timed_out(url.as_str(), opts.poll_timeout),
        };

        (domain, url, result)
    }
}
