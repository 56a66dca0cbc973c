//! The streaming pipeline coordinator - the control loop for one run.
//!
//! Fans out concurrent fetches (bounded by an admission gate) and, as
//! each fetch completes, immediately starts that URL's extraction.
//! Extraction is driven by fetch completion rate and is not throttled
//! by the fetch gate. All `RunRecord` mutation happens on the
//! coordinator's own poll loop, one completion at a time - the fan-out
//! is "start many, react to each as it finishes", never "mutate state
//! from multiple threads at once".

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::{ExtractError, ExtractOpResult, FetchOpResult};
use crate::pipeline::aggregate::{aggregate, validate_extractions};
use crate::pipeline::fallback::{merge_fetch_results, urls_needing_fallback};
use crate::pipeline::fast_path::{FastPathOutcome, FastPathService};
use crate::traits::extractor::{ExtractResult, Extractor};
use crate::traits::fetcher::{FetchOptions, FetchPayload, FetchResult, Fetcher};
use crate::traits::searcher::Searcher;
use crate::types::config::{FastPathMode, PipelineConfig};
use crate::types::entity::{EntityToImpute, RetainField};
use crate::types::record::RunRecord;

/// One completed unit of in-flight work.
enum Completion {
    Fetch {
        url: String,
        outcome: FetchOpResult<FetchResult>,
    },
    Extract {
        url: String,
        outcome: ExtractOpResult<ExtractResult>,
    },
}

/// The pipeline for one entity run.
///
/// Collaborators are injected at construction and the pipeline is
/// reusable across runs; each `run` call owns its record exclusively.
pub struct ImputePipeline<S, F, X> {
    searcher: S,
    fetcher: F,
    extractor: X,
    config: PipelineConfig,
}

impl<S, F, X> ImputePipeline<S, F, X>
where
    S: Searcher,
    F: Fetcher,
    X: Extractor,
{
    /// Create a pipeline from its collaborators and configuration.
    pub fn new(searcher: S, fetcher: F, extractor: X, config: PipelineConfig) -> Self {
        Self {
            searcher,
            fetcher,
            extractor,
            config,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one run. Always returns a record; every failure, fatal
    /// or per-URL, is encoded in `success` and `errors`.
    pub async fn run(&self, entity: &EntityToImpute, schema: &[RetainField]) -> RunRecord {
        let start = Instant::now();
        let mut record = RunRecord::initialize(entity, schema);
        info!(entity = %entity.name, query = %record.query, "starting imputation run");

        // Phase 0: fast path, per configured mode.
        if self.config.fast_path.enabled && self.config.fast_path.mode != FastPathMode::Disabled {
            let service = FastPathService::new(&self.fetcher, &self.config.fast_path);
            let outcome = service.execute(entity).await;
            self.record_fast_path(&mut record, &outcome);

            match self.config.fast_path.mode {
                FastPathMode::Only => {
                    return self.finish(record, start, outcome.satisfied);
                }
                FastPathMode::WithFallback if outcome.satisfied => {
                    info!("fast path produced sufficient content; skipping discovery");
                    return self.finish(record, start, true);
                }
                _ => {}
            }
        }

        // Phase 1: discovery. Failure here is non-recoverable.
        if !self.discover(&mut record).await {
            return self.finish(record, start, false);
        }

        // Phase 2: fetch + extract fan-out.
        if self.config.streaming {
            self.run_streaming(&mut record, start).await;
        } else {
            self.run_batch(&mut record, start).await;
        }

        if record.performance.successful_fetches == 0 {
            record.record_error("no URL fetched successfully");
            return self.finish(record, start, false);
        }

        // Phase 3: budget re-fetch when spending crossed the ceiling.
        self.run_cost_fallback(&mut record, start).await;

        // Phase 4: validation + aggregation.
        self.aggregate_results(&mut record);

        let success = record.detail.urls_extracted > 0 && !record.final_content.is_empty();
        self.finish(record, start, success)
    }

    fn finish(&self, mut record: RunRecord, start: Instant, success: bool) -> RunRecord {
        record.performance.total_elapsed = start.elapsed();
        record.finalize(success);
        info!(
            success = record.success,
            urls_found = record.performance.urls_found,
            successful_fetches = record.performance.successful_fetches,
            successful_extractions = record.performance.successful_extractions,
            total_cost = record.costs.total(),
            discovery_cost = record.costs.discovery_cost,
            fetch_cost = record.costs.fetch_cost,
            extraction_cost = record.costs.extraction_cost,
            elapsed = ?record.performance.total_elapsed,
            time_to_first_result = ?record.performance.time_to_first_result,
            errors = record.errors.len(),
            "imputation run finished"
        );
        record
    }

    fn record_fast_path(&self, record: &mut RunRecord, outcome: &FastPathOutcome) {
        let floor = self.config.fast_path.min_result_size;
        record.register_urls(outcome.results.keys().map(String::as_str));

        let mut recorded = IndexMap::with_capacity(outcome.results.len());
        for (url, result) in &outcome.results {
            record.mark_url_fetching(url);

            let result = if result.is_ready() && result.content_size() < floor {
                result.clone().demote_undersized(floor)
            } else {
                result.clone()
            };

            record.mark_url_fetched(url, result.is_ready());
            if !result.is_ready() {
                record.record_error(format!(
                    "fast path fetch failed for {url}: {}",
                    result.error.clone().unwrap_or_else(|| "unknown".to_string())
                ));
            }
            record.fetch_results.insert(url.clone(), result.clone());
            recorded.insert(url.clone(), result);
        }

        // Fast-path spend counts toward the run whatever the outcome.
        record.costs.fetch_cost += outcome.cost;
        record.performance.fast_path_duration = outcome.duration;
        if outcome.satisfied && record.performance.time_to_first_result.is_none() {
            record.performance.time_to_first_result = Some(outcome.duration);
        }
        record.fast_path_results = Some(recorded);
    }

    /// Run discovery with its retry policy. Returns false when the run
    /// must fail: backend errors past the retry budget, an unsuccessful
    /// search, or zero links.
    async fn discover(&self, record: &mut RunRecord) -> bool {
        let cfg = &self.config.discovery;
        let started = Instant::now();

        let mut attempt = 0;
        let outcome = loop {
            match self.searcher.search(&record.query, cfg.result_count).await {
                Ok(outcome) => break Some(outcome),
                Err(e) => {
                    attempt += 1;
                    if attempt > cfg.max_retries {
                        record.record_error(format!("discovery failed: {e}"));
                        break None;
                    }
                    warn!(error = %e, attempt, "discovery attempt failed, retrying");
                    tokio::time::sleep(cfg.retry_delay).await;
                }
            }
        };
        record.performance.discovery_duration = started.elapsed();

        let Some(outcome) = outcome else {
            return false;
        };
        record.costs.discovery_cost += outcome.cost;

        if !outcome.success || outcome.links.is_empty() {
            record.record_error(format!(
                "discovery returned no usable links for query '{}'",
                record.query
            ));
            return false;
        }

        // Deduplicate while preserving rank order, then cap.
        let mut seen = HashSet::new();
        let mut links: Vec<String> = outcome
            .links
            .into_iter()
            .filter(|link| seen.insert(link.clone()))
            .collect();
        links.truncate(cfg.result_count);

        info!(
            count = links.len(),
            elapsed = ?record.performance.discovery_duration,
            "discovery completed"
        );
        record.mark_discovery_completed(links);
        true
    }

    /// Streaming fan-out: one poll loop over a single set of in-flight
    /// futures. A completed fetch immediately injects its extraction
    /// future; completion order across URLs carries no guarantees.
    async fn run_streaming(&self, record: &mut RunRecord, run_start: Instant) {
        let schema = record.schema.clone();
        let gate = Arc::new(Semaphore::new(self.config.fetch.concurrency.max(1)));
        let opts = FetchOptions::full(&self.config.fetch);

        let mut inflight: FuturesUnordered<BoxFuture<'_, Completion>> = FuturesUnordered::new();
        for url in record.discovered_urls.clone() {
            record.mark_url_fetching(&url);
            let gate = Arc::clone(&gate);
            let opts = opts.clone();
            inflight.push(
                async move {
                    let (url, outcome) = self.fetch_one(url, gate, opts).await;
                    Completion::Fetch { url, outcome }
                }
                .boxed(),
            );
        }

        while let Some(event) = inflight.next().await {
            match event {
                Completion::Fetch { url, outcome } => {
                    if let Some(payload) = self.observe_fetch(record, &url, outcome) {
                        record.mark_url_extracting(&url);
                        let schema = &schema;
                        inflight.push(
                            async move {
                                let (url, outcome) = self.extract_one(url, payload, schema).await;
                                Completion::Extract { url, outcome }
                            }
                            .boxed(),
                        );
                    }
                }
                Completion::Extract { url, outcome } => {
                    self.observe_extraction(record, run_start, &url, outcome);
                }
            }
        }
    }

    /// Batch fan-out: every fetch finishes before any extraction runs.
    /// Same state machine and counters as streaming.
    async fn run_batch(&self, record: &mut RunRecord, run_start: Instant) {
        let gate = Arc::new(Semaphore::new(self.config.fetch.concurrency.max(1)));
        let opts = FetchOptions::full(&self.config.fetch);

        let mut fetches: FuturesUnordered<_> = record
            .discovered_urls
            .clone()
            .into_iter()
            .map(|url| self.fetch_one(url, Arc::clone(&gate), opts.clone()))
            .collect();
        for url in record.discovered_urls.clone() {
            record.mark_url_fetching(&url);
        }

        let mut ready: Vec<(String, FetchPayload)> = Vec::new();
        while let Some((url, outcome)) = fetches.next().await {
            if let Some(payload) = self.observe_fetch(record, &url, outcome) {
                ready.push((url, payload));
            }
        }
        drop(fetches);

        let schema = record.schema.clone();
        for (url, _) in &ready {
            record.mark_url_extracting(url);
        }
        let mut extractions: FuturesUnordered<_> = ready
            .into_iter()
            .map(|(url, payload)| self.extract_one(url, payload, &schema))
            .collect();
        while let Some((url, outcome)) = extractions.next().await {
            self.observe_extraction(record, run_start, &url, outcome);
        }
    }

    /// Budget re-fetch pass. Runs only when the primary pass spent past
    /// the ceiling; retries failed URLs on the cheaper tier, merges the
    /// passes, and extracts anything that newly became ready.
    async fn run_cost_fallback(&self, record: &mut RunRecord, run_start: Instant) {
        let cfg = &self.config.fetch;
        if !cfg.budget.enabled || record.costs.fetch_cost <= cfg.max_cost {
            return;
        }

        let outstanding = urls_needing_fallback(&record.fetch_results);
        if outstanding.is_empty() {
            return;
        }

        warn!(
            fetch_cost = record.costs.fetch_cost,
            ceiling = cfg.max_cost,
            urls = outstanding.len(),
            "fetch spend over ceiling, retrying failed URLs on budget tier"
        );
        record.record_warning(format!(
            "fetch cost {:.4} exceeded ceiling {:.4}; budget pass over {} URLs",
            record.costs.fetch_cost,
            cfg.max_cost,
            outstanding.len()
        ));

        let gate = Arc::new(Semaphore::new(cfg.concurrency.max(1)));
        let opts = FetchOptions::budget(cfg);

        let mut fetches: FuturesUnordered<_> = outstanding
            .into_iter()
            .map(|url| self.fetch_one(url, Arc::clone(&gate), opts.clone()))
            .collect();

        let mut budget_results: IndexMap<String, FetchResult> = IndexMap::new();
        while let Some((url, outcome)) = fetches.next().await {
            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    record.record_error(format!("budget fetch failed for {url}: {e}"));
                    FetchResult::errored(url.as_str(), e.to_string())
                }
            };
            record.costs.fetch_cost += result.cost;

            let result = if result.is_ready() && result.content_size() < self.config.min_content_size
            {
                result.demote_undersized(self.config.min_content_size)
            } else {
                result
            };
            budget_results.insert(url, result);
        }
        drop(fetches);

        let merged = merge_fetch_results(&record.fetch_results, &budget_results);

        let rescued: Vec<(String, FetchPayload)> = merged
            .iter()
            .filter(|(url, result)| {
                result.is_ready()
                    && !record
                        .fetch_results
                        .get(*url)
                        .map(FetchResult::is_ready)
                        .unwrap_or(false)
            })
            .filter_map(|(url, result)| result.data.clone().map(|data| (url.clone(), data)))
            .collect();

        record.fetch_results = merged;
        if rescued.is_empty() {
            return;
        }

        info!(urls = rescued.len(), "budget pass rescued URLs, extracting");
        let schema = record.schema.clone();
        let mut extractions: FuturesUnordered<_> = rescued
            .into_iter()
            .map(|(url, payload)| {
                record.mark_url_fetched(&url, true);
                record.mark_url_extracting(&url);
                self.extract_one(url, payload, &schema)
            })
            .collect();
        while let Some((url, outcome)) = extractions.next().await {
            self.observe_extraction(record, run_start, &url, outcome);
        }
    }

    async fn fetch_one(
        &self,
        url: String,
        gate: Arc<Semaphore>,
        opts: FetchOptions,
    ) -> (String, FetchOpResult<FetchResult>) {
        let _permit = gate.acquire_owned().await.expect("fetch gate closed");

        let outcome = match timeout(opts.poll_timeout, self.fetcher.fetch(&url, &opts)).await {
            Ok(outcome) => outcome,
            Err(_) => Ok(FetchResult::timed_out(url.as_str(), opts.poll_timeout)),
        };
        (url, outcome)
    }

    async fn extract_one(
        &self,
        url: String,
        payload: FetchPayload,
        schema: &[RetainField],
    ) -> (String, ExtractOpResult<ExtractResult>) {
        let outcome = match timeout(
            self.config.extraction.timeout,
            self.extractor.extract(&payload, schema),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ExtractError::Timeout),
        };
        (url, outcome)
    }

    /// React to one fetch completion. Returns the payload when the URL
    /// should proceed to extraction.
    fn observe_fetch(
        &self,
        record: &mut RunRecord,
        url: &str,
        outcome: FetchOpResult<FetchResult>,
    ) -> Option<FetchPayload> {
        let result = match outcome {
            Ok(result) => result,
            Err(e) => FetchResult::errored(url, e.to_string()),
        };
        record.costs.fetch_cost += result.cost;

        let min = self.config.min_content_size;
        let result = if result.is_ready() && result.content_size() < min {
            let size = result.content_size();
            warn!(url = %url, size, min, "content below size floor, treating fetch as failed");
            result.demote_undersized(min)
        } else {
            result
        };

        let ready = result.is_ready();
        if ready {
            info!(
                url = %url,
                size = result.content_size(),
                cost = result.cost,
                "fetched"
            );
        } else {
            record.record_error(format!(
                "fetch failed for {url}: {}",
                result.error.clone().unwrap_or_else(|| "unknown".to_string())
            ));
            warn!(url = %url, status = ?result.status, "fetch failed");
        }

        record.mark_url_fetched(url, ready);
        let payload = if ready { result.data.clone() } else { None };
        record.fetch_results.insert(url.to_string(), result);
        payload
    }

    /// React to one extraction completion.
    fn observe_extraction(
        &self,
        record: &mut RunRecord,
        run_start: Instant,
        url: &str,
        outcome: ExtractOpResult<ExtractResult>,
    ) {
        let result = match outcome {
            Ok(result) => result,
            Err(e) => ExtractResult::failed(e.to_string()),
        };
        record.costs.extraction_cost += result.cost;

        if result.success {
            info!(
                url = %url,
                fields = result.filled_field_count(),
                cost = result.cost,
                "extracted"
            );
            if record.performance.time_to_first_result.is_none() {
                record.performance.time_to_first_result = Some(run_start.elapsed());
            }
            // Provisional seed; aggregation replaces it later.
            if record.final_content.is_empty() {
                if let Some(content) = &result.content {
                    record.final_content = content.clone();
                }
            }
        } else {
            record.record_error(format!(
                "extraction failed for {url}: {}",
                result.error.clone().unwrap_or_else(|| "unknown".to_string())
            ));
            warn!(url = %url, "extraction failed");
        }

        record.mark_url_extracted(url, result.success);
        record.extract_results.insert(url.to_string(), result);
    }

    /// Validate extractions against the completeness gate, retrying
    /// once with a relaxed bar when below the configured minimum, then
    /// aggregate the survivors into the final answer.
    fn aggregate_results(&self, record: &mut RunRecord) {
        let threshold = self.config.extraction.completeness_threshold;
        let mut kept = validate_extractions(&record.extract_results, &record.schema, threshold);

        if kept.len() < self.config.min_successful_extractions {
            let relaxed = threshold / 2.0;
            warn!(
                kept = kept.len(),
                min = self.config.min_successful_extractions,
                relaxed,
                "below minimum validated extractions, retrying with relaxed completeness"
            );
            record.record_warning(format!(
                "only {} validated extractions (minimum {}); relaxed completeness to {:.2}",
                kept.len(),
                self.config.min_successful_extractions,
                relaxed
            ));
            kept = validate_extractions(&record.extract_results, &record.schema, relaxed);
        }

        if kept.is_empty() {
            record.final_content.clear();
            record.record_error("aggregation produced no usable content");
            return;
        }

        let aggregation = aggregate(&kept);
        info!(
            fields = aggregation.fields.len(),
            sources = aggregation.source_urls.len(),
            "aggregation complete"
        );
        record.final_content = aggregation.fields;
        record.provenance = aggregation.provenance;
    }
}
