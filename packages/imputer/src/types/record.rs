//! The aggregate run record - the single source of truth for one run.
//!
//! Created once by the coordinator's initialization step, mutated only
//! from the coordinator's own control flow while the run is live, and
//! frozen by `finalize`. Every mutation after a terminal state is a
//! silent no-op, so a finished record can be handed out freely.

use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::traits::extractor::ExtractResult;
use crate::traits::fetcher::FetchResult;
use crate::types::entity::{EntityToImpute, RetainField};

/// Run-level status. `Finished` and `Failed` are the only terminal
/// states; there is no resumption from either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Initializing,
    Running,
    Finished,
    Failed,
}

/// Per-URL state machine:
/// `Discovered -> Fetching -> {Fetched | FetchFailed} -> [Extracting -> {Extracted | ExtractFailed}]`.
///
/// A URL whose fetched content is below the configured size floor is
/// forced into `FetchFailed` even when the backend reported success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlState {
    Discovered,
    Fetching,
    Fetched,
    FetchFailed,
    Extracting,
    Extracted,
    ExtractFailed,
}

/// Live progress counters plus the per-URL state map.
///
/// `urls_fetching` and `urls_extracting` are gauges of in-flight work;
/// `urls_fetched` and `urls_extracted` count successes and only ever
/// grow. The invariant `urls_extracted <= urls_fetched <= urls_found`
/// holds at every observation point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusDetail {
    pub current_status: RunStatus,
    pub per_url_states: IndexMap<String, UrlState>,
    pub urls_found: usize,
    pub urls_fetching: usize,
    pub urls_fetched: usize,
    pub urls_extracting: usize,
    pub urls_extracted: usize,
    pub last_update: DateTime<Utc>,
}

impl StatusDetail {
    fn new() -> Self {
        Self {
            current_status: RunStatus::Initializing,
            per_url_states: IndexMap::new(),
            urls_found: 0,
            urls_fetching: 0,
            urls_fetched: 0,
            urls_extracting: 0,
            urls_extracted: 0,
            last_update: Utc::now(),
        }
    }

    fn touch(&mut self) {
        self.last_update = Utc::now();
    }
}

/// Timing and throughput metrics for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Performance {
    pub discovery_duration: Duration,
    pub fast_path_duration: Duration,
    pub total_elapsed: Duration,
    pub time_to_first_result: Option<Duration>,
    pub urls_found: usize,
    pub successful_fetches: usize,
    pub successful_extractions: usize,
}

/// Cost accounting by pipeline component. `total` is always derived,
/// never stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Costs {
    pub discovery_cost: f64,
    pub fetch_cost: f64,
    pub extraction_cost: f64,
}

impl Costs {
    /// Total spend across all components.
    pub fn total(&self) -> f64 {
        self.discovery_cost + self.fetch_cost + self.extraction_cost
    }
}

/// Which source supplied a final field, and with what quality signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldProvenance {
    pub source_url: String,
    pub elapsed: Duration,
    pub reduction_ratio: Option<f64>,
}

/// The mutable aggregate for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Search query built from the entity
    pub query: String,

    /// Fields the run is retaining
    pub schema: Vec<RetainField>,

    /// Run-level status
    pub status: RunStatus,

    /// Progress counters and per-URL states
    pub detail: StatusDetail,

    /// Links produced by discovery, in discovery order
    pub discovered_urls: Vec<String>,

    /// Fetch outcome per URL (fast-path fetches included)
    pub fetch_results: IndexMap<String, FetchResult>,

    /// Extraction outcome per URL
    pub extract_results: IndexMap<String, ExtractResult>,

    /// Raw fast-path fetches, kept separately for inspection
    pub fast_path_results: Option<IndexMap<String, FetchResult>>,

    /// The aggregated answer: field name -> value
    pub final_content: IndexMap<String, Value>,

    /// Which source won each final field
    pub provenance: IndexMap<String, FieldProvenance>,

    /// Timing and throughput metrics
    pub performance: Performance,

    /// Cost accounting
    pub costs: Costs,

    /// Ordered audit trail of every failure, fatal or not
    pub errors: Vec<String>,

    /// Non-fatal notices
    pub warnings: Vec<String>,

    /// Overall outcome, set by `finalize`
    pub success: bool,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Initialize a record for one run. The query is the entity name
    /// plus its optional context strings, space-separated.
    pub fn initialize(entity: &EntityToImpute, schema: &[RetainField]) -> Self {
        Self {
            query: entity.query(),
            schema: schema.to_vec(),
            status: RunStatus::Initializing,
            detail: StatusDetail::new(),
            discovered_urls: Vec::new(),
            fetch_results: IndexMap::new(),
            extract_results: IndexMap::new(),
            fast_path_results: None,
            final_content: IndexMap::new(),
            provenance: IndexMap::new(),
            performance: Performance::default(),
            costs: Costs::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
            success: false,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Whether the run has reached `Finished` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RunStatus::Finished | RunStatus::Failed)
    }

    fn guard(&self) -> bool {
        if self.is_terminal() {
            debug!(status = ?self.status, "ignoring mutation of terminal run record");
            return false;
        }
        true
    }

    /// Move the run into `Running`.
    pub fn start_running(&mut self) {
        if !self.guard() {
            return;
        }
        self.status = RunStatus::Running;
        self.detail.current_status = RunStatus::Running;
        self.detail.touch();
    }

    /// Register URLs as known to the run before they are fetched. Used
    /// both for discovery output and for fast-path direct URLs so the
    /// found/fetched/extracted counters stay ordered.
    pub fn register_urls<'a>(&mut self, urls: impl IntoIterator<Item = &'a str>) {
        if !self.guard() {
            return;
        }
        for url in urls {
            if !self.detail.per_url_states.contains_key(url) {
                self.detail
                    .per_url_states
                    .insert(url.to_string(), UrlState::Discovered);
                self.detail.urls_found += 1;
                self.performance.urls_found += 1;
            }
        }
        self.detail.touch();
    }

    /// Record discovery output and move into `Running`.
    pub fn mark_discovery_completed(&mut self, urls: Vec<String>) {
        if !self.guard() {
            return;
        }
        self.register_urls(urls.iter().map(String::as_str));
        self.discovered_urls = urls;
        self.start_running();
    }

    /// A URL's fetch has started.
    pub fn mark_url_fetching(&mut self, url: &str) {
        if !self.guard() {
            return;
        }
        let state = self
            .detail
            .per_url_states
            .entry(url.to_string())
            .or_insert(UrlState::Discovered);
        if *state == UrlState::Discovered || *state == UrlState::FetchFailed {
            *state = UrlState::Fetching;
            self.detail.urls_fetching += 1;
        }
        self.detail.touch();
    }

    /// A URL's fetch has completed. Idempotent: marking the same URL
    /// fetched twice never double-counts `successful_fetches`.
    pub fn mark_url_fetched(&mut self, url: &str, success: bool) {
        if !self.guard() {
            return;
        }
        let prev = self
            .detail
            .per_url_states
            .get(url)
            .copied()
            .unwrap_or(UrlState::Discovered);

        if prev == UrlState::Fetching {
            self.detail.urls_fetching = self.detail.urls_fetching.saturating_sub(1);
        }

        match (prev, success) {
            // Already counted as a success; nothing more to do.
            (UrlState::Fetched | UrlState::Extracting | UrlState::Extracted | UrlState::ExtractFailed, _) => {}
            (_, true) => {
                self.detail
                    .per_url_states
                    .insert(url.to_string(), UrlState::Fetched);
                self.detail.urls_fetched += 1;
                self.performance.successful_fetches += 1;
            }
            (_, false) => {
                self.detail
                    .per_url_states
                    .insert(url.to_string(), UrlState::FetchFailed);
            }
        }
        self.detail.touch();
    }

    /// A URL's extraction has started. Only valid after a successful
    /// fetch; anything else is ignored.
    pub fn mark_url_extracting(&mut self, url: &str) {
        if !self.guard() {
            return;
        }
        if self.detail.per_url_states.get(url) == Some(&UrlState::Fetched) {
            self.detail
                .per_url_states
                .insert(url.to_string(), UrlState::Extracting);
            self.detail.urls_extracting += 1;
            self.detail.touch();
        }
    }

    /// A URL's extraction has completed. Idempotent like
    /// `mark_url_fetched`.
    pub fn mark_url_extracted(&mut self, url: &str, success: bool) {
        if !self.guard() {
            return;
        }
        let prev = self.detail.per_url_states.get(url).copied();

        if prev == Some(UrlState::Extracting) {
            self.detail.urls_extracting = self.detail.urls_extracting.saturating_sub(1);
        }

        match (prev, success) {
            (Some(UrlState::Extracted), _) => {}
            (Some(UrlState::Extracting | UrlState::Fetched | UrlState::ExtractFailed), true) => {
                self.detail
                    .per_url_states
                    .insert(url.to_string(), UrlState::Extracted);
                self.detail.urls_extracted += 1;
                self.performance.successful_extractions += 1;
            }
            (Some(UrlState::Extracting | UrlState::Fetched), false) => {
                self.detail
                    .per_url_states
                    .insert(url.to_string(), UrlState::ExtractFailed);
            }
            _ => {}
        }
        self.detail.touch();
    }

    /// Append a failure to the audit trail.
    pub fn record_error(&mut self, message: impl Into<String>) {
        if !self.guard() {
            return;
        }
        self.errors.push(message.into());
    }

    /// Append a non-fatal notice.
    pub fn record_warning(&mut self, message: impl Into<String>) {
        if !self.guard() {
            return;
        }
        self.warnings.push(message.into());
    }

    /// Freeze the record. After this call every mutator is a no-op.
    pub fn finalize(&mut self, success: bool) {
        if !self.guard() {
            return;
        }
        self.success = success;
        self.status = if success {
            RunStatus::Finished
        } else {
            RunStatus::Failed
        };
        self.detail.current_status = self.status;
        self.completed_at = Some(Utc::now());
        self.detail.touch();
    }

    /// One-line progress summary for logs and dashboards.
    pub fn live_summary(&self) -> String {
        format!(
            "{} found, {} fetching, {} fetched, {} extracting, {} extracted, ${:.4} spent",
            self.detail.urls_found,
            self.detail.urls_fetching,
            self.detail.urls_fetched,
            self.detail.urls_extracting,
            self.detail.urls_extracted,
            self.costs.total(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RunRecord {
        let entity = EntityToImpute::new("BAV99").unwrap();
        let schema = vec![RetainField::new("component_type", "Type of component")];
        RunRecord::initialize(&entity, &schema)
    }

    #[test]
    fn test_counter_ordering_invariant_at_every_step() {
        let mut rec = record();
        let urls = vec!["https://a.com".to_string(), "https://b.com".to_string()];
        rec.mark_discovery_completed(urls.clone());

        let check = |rec: &RunRecord| {
            assert!(rec.detail.urls_extracted <= rec.detail.urls_fetched);
            assert!(rec.detail.urls_fetched <= rec.detail.urls_found);
        };

        check(&rec);
        for url in &urls {
            rec.mark_url_fetching(url);
            check(&rec);
        }
        rec.mark_url_fetched("https://a.com", true);
        check(&rec);
        rec.mark_url_fetched("https://b.com", false);
        check(&rec);
        rec.mark_url_extracting("https://a.com");
        check(&rec);
        rec.mark_url_extracted("https://a.com", true);
        check(&rec);
    }

    #[test]
    fn test_mark_fetched_idempotent() {
        let mut rec = record();
        rec.mark_discovery_completed(vec!["https://a.com".to_string()]);
        rec.mark_url_fetching("https://a.com");
        rec.mark_url_fetched("https://a.com", true);
        rec.mark_url_fetched("https://a.com", true);
        rec.mark_url_fetched("https://a.com", true);

        assert_eq!(rec.performance.successful_fetches, 1);
        assert_eq!(rec.detail.urls_fetched, 1);
        assert!(rec.live_summary().contains("1 fetched"));
    }

    #[test]
    fn test_mark_extracted_idempotent() {
        let mut rec = record();
        rec.mark_discovery_completed(vec!["https://a.com".to_string()]);
        rec.mark_url_fetching("https://a.com");
        rec.mark_url_fetched("https://a.com", true);
        rec.mark_url_extracting("https://a.com");
        rec.mark_url_extracted("https://a.com", true);
        rec.mark_url_extracted("https://a.com", true);

        assert_eq!(rec.performance.successful_extractions, 1);
        assert_eq!(rec.detail.urls_extracted, 1);
    }

    #[test]
    fn test_fetch_failed_then_fallback_success_counts_once() {
        let mut rec = record();
        rec.mark_discovery_completed(vec!["https://a.com".to_string()]);
        rec.mark_url_fetching("https://a.com");
        rec.mark_url_fetched("https://a.com", false);
        assert_eq!(rec.performance.successful_fetches, 0);

        // Budget fallback rescued the URL.
        rec.mark_url_fetched("https://a.com", true);
        rec.mark_url_fetched("https://a.com", true);
        assert_eq!(rec.performance.successful_fetches, 1);
        assert_eq!(
            rec.detail.per_url_states.get("https://a.com"),
            Some(&UrlState::Fetched)
        );
    }

    #[test]
    fn test_extracting_requires_successful_fetch() {
        let mut rec = record();
        rec.mark_discovery_completed(vec!["https://a.com".to_string()]);
        rec.mark_url_fetching("https://a.com");
        rec.mark_url_fetched("https://a.com", false);
        rec.mark_url_extracting("https://a.com");

        assert_eq!(rec.detail.urls_extracting, 0);
        assert_eq!(
            rec.detail.per_url_states.get("https://a.com"),
            Some(&UrlState::FetchFailed)
        );
    }

    #[test]
    fn test_terminal_record_ignores_mutation() {
        let mut rec = record();
        rec.mark_discovery_completed(vec!["https://a.com".to_string()]);
        rec.finalize(true);
        assert_eq!(rec.status, RunStatus::Finished);

        let found_before = rec.detail.urls_found;
        rec.mark_url_fetching("https://a.com");
        rec.mark_url_fetched("https://a.com", true);
        rec.record_error("late error");
        rec.finalize(false);

        assert_eq!(rec.status, RunStatus::Finished);
        assert_eq!(rec.detail.urls_found, found_before);
        assert_eq!(rec.performance.successful_fetches, 0);
        assert!(rec.errors.is_empty());
    }

    #[test]
    fn test_total_cost_is_derived() {
        let mut rec = record();
        rec.costs.discovery_cost = 0.5;
        rec.costs.fetch_cost = 1.25;
        rec.costs.extraction_cost = 0.25;
        assert!((rec.costs.total() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_register_urls_deduplicates() {
        let mut rec = record();
        rec.register_urls(["https://a.com", "https://a.com", "https://b.com"]);
        assert_eq!(rec.detail.urls_found, 2);
    }
}
