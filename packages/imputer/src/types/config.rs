//! Configuration for one pipeline run.
//!
//! Pure value objects assembled once per run. The coordinator never
//! mutates a config except through an explicit policy decision (the
//! relaxed validation retry clones the extraction config with a lower
//! threshold rather than editing the original).

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Configuration for the discovery stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Number of candidate links to request from the search backend
    pub result_count: usize,

    /// Retries of the search call before discovery is declared failed
    pub max_retries: u32,

    /// Delay between discovery retries
    pub retry_delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            result_count: 10,
            max_retries: 1,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// The cheaper fetch variant used when spending crosses the ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetFetchConfig {
    /// Whether the cost fallback pass may run at all
    pub enabled: bool,

    /// Poll interval for budget-tier fetches
    pub poll_interval: Duration,

    /// Poll timeout for budget-tier fetches
    pub poll_timeout: Duration,
}

impl Default for BudgetFetchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(60),
        }
    }
}

/// Configuration for the fetch stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum fetches in flight at once (the admission gate)
    pub concurrency: usize,

    /// Poll interval passed to the fetch backend
    pub poll_interval: Duration,

    /// Per-fetch timeout; exceeding it fails that URL, not the run
    pub poll_timeout: Duration,

    /// Fetch-cost ceiling; crossing it triggers the budget fallback pass
    pub max_cost: f64,

    /// Cheaper variant used by the fallback pass
    pub budget: BudgetFetchConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(120),
            max_cost: 10.0,
            budget: BudgetFetchConfig::default(),
        }
    }
}

/// Configuration for the extraction stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Minimum fraction of schema fields with non-empty values for an
    /// extraction to count toward aggregation
    pub completeness_threshold: f64,

    /// Per-extraction timeout
    pub timeout: Duration,

    /// Model hint passed to the extraction backend
    pub model: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            completeness_threshold: 0.5,
            timeout: Duration::from_secs(120),
            model: None,
        }
    }
}

/// How the fast path interacts with the rest of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FastPathMode {
    /// Fast path never runs
    Disabled,

    /// Only the fast path runs; the run finishes on its outcome
    Only,

    /// Fast path runs first; discovery/fetch/extract run unless the fast
    /// path already produced sufficient content
    WithFallback,
}

/// Configuration for the fast-path decision service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastPathConfig {
    /// Master switch; `mode` is ignored when false
    pub enabled: bool,

    /// Short-circuit behavior
    pub mode: FastPathMode,

    /// Domain name -> URL template. Templates may contain a `{query}`
    /// placeholder; otherwise the encoded entity name is appended.
    pub domains: IndexMap<String, String>,

    /// Minimum content size for a fast-path fetch to count as success
    pub min_result_size: usize,

    /// Poll interval for fast-path fetches
    pub poll_interval: Duration,

    /// Poll timeout for fast-path fetches (usually shorter than the
    /// main fetch timeout)
    pub poll_timeout: Duration,

    /// Concurrency of the fast-path fetch pool, independent of the main
    /// fetch gate
    pub concurrency: usize,
}

impl Default for FastPathConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: FastPathMode::Disabled,
            domains: IndexMap::new(),
            min_result_size: 1000,
            poll_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(30),
            concurrency: 2,
        }
    }
}

impl FastPathConfig {
    /// Add a domain template.
    pub fn with_domain(
        mut self,
        domain: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.domains.insert(domain.into(), template.into());
        self
    }

    /// Build the direct URLs for an entity, one per configured domain.
    ///
    /// The entity name is percent-encoded before substitution so query
    /// strings stay valid for names containing spaces or reserved chars.
    pub fn urls_for(&self, entity_name: &str) -> IndexMap<String, String> {
        let encoded: String = url::form_urlencoded::byte_serialize(entity_name.as_bytes()).collect();
        self.domains
            .iter()
            .map(|(domain, template)| {
                let url = if template.contains("{query}") {
                    template.replace("{query}", &encoded)
                } else {
                    format!("{template}{encoded}")
                };
                (domain.clone(), url)
            })
            .collect()
    }
}

/// Master configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Discovery stage settings
    pub discovery: DiscoveryConfig,

    /// Fetch stage settings
    pub fetch: FetchConfig,

    /// Extraction stage settings
    pub extraction: ExtractionConfig,

    /// Fast-path settings
    pub fast_path: FastPathConfig,

    /// Fetched content below this size is treated as a failed fetch
    /// (error pages and bot walls tend to be tiny)
    pub min_content_size: usize,

    /// Below this many validated extractions, validation retries once
    /// with a relaxed completeness threshold
    pub min_successful_extractions: usize,

    /// Streaming strategy: extract each URL as its fetch completes.
    /// When false, all fetches finish before any extraction starts.
    pub streaming: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            fetch: FetchConfig::default(),
            extraction: ExtractionConfig::default(),
            fast_path: FastPathConfig::default(),
            min_content_size: 5000,
            min_successful_extractions: 1,
            streaming: true,
        }
    }
}

impl PipelineConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings tuned for development: fewer URLs, shorter timeouts,
    /// a lower content floor.
    pub fn development() -> Self {
        let mut config = Self::default();
        config.discovery.result_count = 5;
        config.fetch.poll_timeout = Duration::from_secs(60);
        config.min_content_size = 3000;
        config
    }

    /// Settings tuned for production: more URLs, longer timeouts, a
    /// higher content floor, budget fallback armed.
    pub fn production() -> Self {
        let mut config = Self::default();
        config.discovery.result_count = 15;
        config.fetch.poll_timeout = Duration::from_secs(180);
        config.fetch.budget.enabled = true;
        config.min_content_size = 10_000;
        config
    }

    /// Fast path only: the run finishes on the fast-path outcome and
    /// never touches discovery or extraction.
    pub fn fast_path_only(domains: IndexMap<String, String>) -> Self {
        let mut config = Self::default();
        config.fast_path.enabled = true;
        config.fast_path.mode = FastPathMode::Only;
        config.fast_path.domains = domains;
        config.fast_path.poll_timeout = Duration::from_secs(200);
        config.fast_path.poll_interval = Duration::from_secs(10);
        config
    }

    /// Fast path first, with the normal pipeline as fallback.
    pub fn fast_path_with_fallback(domains: IndexMap<String, String>) -> Self {
        let mut config = Self::default();
        config.fast_path.enabled = true;
        config.fast_path.mode = FastPathMode::WithFallback;
        config.fast_path.domains = domains;
        config.fast_path.min_result_size = 5000;
        config.discovery.result_count = 5;
        config
    }

    /// Set the streaming strategy.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Set the minimum content size.
    pub fn with_min_content_size(mut self, size: usize) -> Self {
        self.min_content_size = size;
        self
    }
}
