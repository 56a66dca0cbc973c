//! Testing utilities including mock collaborators.
//!
//! Useful for testing applications built on the pipeline without real
//! search, fetch, or LLM calls. All mocks record their calls so tests
//! can assert on ordering and arguments.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{DiscoveryError, DiscoveryResult, ExtractOpResult, FetchOpResult};
use crate::traits::extractor::{ExtractResult, ExtractionEvent, ExtractionObserver, Extractor};
use crate::traits::fetcher::{FetchOptions, FetchPayload, FetchResult, FetchTier, Fetcher};
use crate::traits::searcher::{SearchOutcome, Searcher};

/// A mock discovery backend with canned results.
#[derive(Clone, Default)]
pub struct MockSearcher {
    outcome: Arc<RwLock<Option<SearchOutcome>>>,
    fail_with_backend_error: Arc<RwLock<bool>>,
    calls: Arc<RwLock<Vec<(String, usize)>>>,
}

impl MockSearcher {
    /// Create a new mock searcher. With no canned outcome it returns
    /// an empty, unsuccessful search.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return these links for any query.
    pub fn with_links(self, urls: &[&str]) -> Self {
        let outcome = SearchOutcome::with_links(urls.iter().map(|u| u.to_string()).collect());
        *self.outcome.write().unwrap() = Some(outcome);
        self
    }

    /// Return a full canned outcome for any query.
    pub fn with_outcome(self, outcome: SearchOutcome) -> Self {
        *self.outcome.write().unwrap() = Some(outcome);
        self
    }

    /// Return an `Err` from every search call.
    pub fn failing(self) -> Self {
        *self.fail_with_backend_error.write().unwrap() = true;
        self
    }

    /// All (query, result_count) pairs searched so far.
    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Searcher for MockSearcher {
    async fn search(&self, query: &str, result_count: usize) -> DiscoveryResult<SearchOutcome> {
        self.calls
            .write()
            .unwrap()
            .push((query.to_string(), result_count));

        if *self.fail_with_backend_error.read().unwrap() {
            return Err(DiscoveryError::Backend(Box::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                "mock search backend down",
            ))));
        }

        Ok(self
            .outcome
            .read()
            .unwrap()
            .clone()
            .unwrap_or_else(|| SearchOutcome::failed("no canned outcome")))
    }
}

/// One recorded fetch call.
#[derive(Debug, Clone)]
pub struct FetchCall {
    pub url: String,
    pub tier: FetchTier,
    pub completed_at: Instant,
}

/// A mock fetch backend with per-URL canned results, optional per-URL
/// artificial delay, and a separate result set for the budget tier.
#[derive(Clone, Default)]
pub struct MockFetcher {
    pages: Arc<RwLock<HashMap<String, FetchResult>>>,
    budget_pages: Arc<RwLock<HashMap<String, FetchResult>>>,
    delays: Arc<RwLock<HashMap<String, Duration>>>,
    calls: Arc<RwLock<Vec<FetchCall>>>,
}

impl MockFetcher {
    /// Create a new mock fetcher. Unknown URLs fail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve this HTML for a URL (full tier).
    pub fn with_page(self, url: &str, content: impl Into<String>) -> Self {
        let result = FetchResult::ready(url, FetchPayload::Html(content.into()));
        self.pages.write().unwrap().insert(url.to_string(), result);
        self
    }

    /// Serve a fully specified result for a URL (full tier).
    pub fn with_result(self, url: &str, result: FetchResult) -> Self {
        self.pages.write().unwrap().insert(url.to_string(), result);
        self
    }

    /// Fail fetches of this URL (full tier).
    pub fn with_failure(self, url: &str) -> Self {
        let result = FetchResult::failed(url, "mock fetch failure");
        self.pages.write().unwrap().insert(url.to_string(), result);
        self
    }

    /// Serve this HTML for a URL under the budget tier only.
    pub fn with_budget_page(self, url: &str, content: impl Into<String>) -> Self {
        let result = FetchResult::ready(url, FetchPayload::Html(content.into()));
        self.budget_pages
            .write()
            .unwrap()
            .insert(url.to_string(), result);
        self
    }

    /// Delay fetches of this URL, for completion-order tests.
    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        self.delays.write().unwrap().insert(url.to_string(), delay);
        self
    }

    /// All fetch calls made so far, in completion order.
    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.read().unwrap().clone()
    }

    /// When the fetch of `url` completed, if it has.
    pub fn completed_at(&self, url: &str) -> Option<Instant> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .find(|c| c.url == url)
            .map(|c| c.completed_at)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, opts: &FetchOptions) -> FetchOpResult<FetchResult> {
        let delay = self.delays.read().unwrap().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = match opts.tier {
            FetchTier::Budget => {
                let budget = self.budget_pages.read().unwrap().get(url).cloned();
                budget.or_else(|| self.pages.read().unwrap().get(url).cloned())
            }
            FetchTier::Full => self.pages.read().unwrap().get(url).cloned(),
        }
        .unwrap_or_else(|| FetchResult::failed(url, "no canned page"));

        self.calls.write().unwrap().push(FetchCall {
            url: url.to_string(),
            tier: opts.tier,
            completed_at: Instant::now(),
        });

        Ok(result)
    }
}

/// One recorded extraction call.
#[derive(Debug, Clone)]
pub struct ExtractCall {
    pub content_preview: String,
    pub started_at: Instant,
}

/// A mock extraction backend.
///
/// Canned results are keyed by a substring of the input content, since
/// extraction does not see URLs. Content without a matching key fails.
#[derive(Clone, Default)]
pub struct MockExtractor {
    extractions: Arc<RwLock<Vec<(String, ExtractResult)>>>,
    calls: Arc<RwLock<Vec<ExtractCall>>>,
}

impl MockExtractor {
    /// Create a new mock extractor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return this result for content containing `content_key`.
    pub fn with_extraction(self, content_key: &str, result: ExtractResult) -> Self {
        self.extractions
            .write()
            .unwrap()
            .push((content_key.to_string(), result));
        self
    }

    /// Shorthand: succeed with the given fields for matching content.
    pub fn with_fields(self, content_key: &str, fields: &[(&str, &str)]) -> Self {
        let content: IndexMap<String, Value> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        self.with_extraction(content_key, ExtractResult::succeeded(content))
    }

    /// Fail extraction for matching content.
    pub fn with_failure(self, content_key: &str) -> Self {
        self.with_extraction(content_key, ExtractResult::failed("mock extraction failure"))
    }

    /// All extraction calls made so far.
    pub fn calls(&self) -> Vec<ExtractCall> {
        self.calls.read().unwrap().clone()
    }

    /// When extraction first ran over content containing `content_key`.
    pub fn started_at(&self, content_key: &str) -> Option<Instant> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .find(|c| c.content_preview.contains(content_key))
            .map(|c| c.started_at)
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(
        &self,
        content: &FetchPayload,
        _schema: &[crate::types::entity::RetainField],
    ) -> ExtractOpResult<ExtractResult> {
        let text = match content {
            FetchPayload::Html(html) => html.clone(),
            FetchPayload::Structured(value) => value.to_string(),
        };

        self.calls.write().unwrap().push(ExtractCall {
            content_preview: text.chars().take(200).collect(),
            started_at: Instant::now(),
        });

        let canned = self
            .extractions
            .read()
            .unwrap()
            .iter()
            .find(|(key, _)| text.contains(key.as_str()))
            .map(|(_, result)| result.clone());

        Ok(canned.unwrap_or_else(|| ExtractResult::failed("no canned extraction")))
    }
}

/// An observer that records every extraction event.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    events: Arc<RwLock<Vec<ExtractionEvent>>>,
}

impl RecordingObserver {
    /// Create a new recording observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events observed so far.
    pub fn events(&self) -> Vec<ExtractionEvent> {
        self.events.read().unwrap().clone()
    }
}

impl ExtractionObserver for RecordingObserver {
    fn on_event(&self, event: &ExtractionEvent) {
        self.events.write().unwrap().push(event.clone());
    }
}
