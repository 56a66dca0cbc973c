//! Streaming Entity-Imputation Pipeline
//!
//! A library that gathers structured data about one named entity by
//! coordinating three stages - discover candidate sources, fetch their
//! content, extract the requested fields - into one continuously
//! updated record with cost and timing accounting.
//!
//! # Design
//!
//! - **Streaming, not batch**: each URL's extraction starts the moment
//!   its fetch completes; slow fetches never block fast ones.
//! - **Single-writer record**: all run state lives in one `RunRecord`,
//!   mutated only from the coordinator's own poll loop as completions
//!   are observed one at a time.
//! - **Explicit dependency injection**: discovery, fetch, and
//!   extraction are traits passed to the coordinator's constructor.
//! - **Contained failures**: per-URL errors are recorded and skipped;
//!   only discovery failure and a total fetch wipeout end a run early.
//!
//! # Usage
//!
//! ```rust,ignore
//! use imputer::{EntityToImpute, ImputePipeline, PipelineConfig, RetainField};
//!
//! let entity = EntityToImpute::new("BAV99")?;
//! let schema = vec![
//!     RetainField::new("component_type", "Type of electronic component"),
//!     RetainField::new("voltage_rating", "Maximum voltage rating"),
//! ];
//!
//! let pipeline = ImputePipeline::new(searcher, fetcher, extractor, PipelineConfig::default());
//! let record = pipeline.run(&entity, &schema).await;
//!
//! if record.success {
//!     println!("{:?}", record.final_content);
//! }
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator abstractions (Searcher, Fetcher, Extractor)
//! - [`types`] - Entity/schema, run configuration, and the run record
//! - [`pipeline`] - The coordinator and its sub-services
//! - [`searchers`] / [`fetchers`] - Reference collaborator implementations
//! - [`security`] - Credential handling
//! - [`testing`] - Mock collaborators for tests

pub mod error;
pub mod fetchers;
pub mod pipeline;
pub mod searchers;
pub mod security;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{DiscoveryError, ExtractError, FetchError, ImputeError};
pub use traits::{
    extractor::{
        ExtractResult, ExtractionEvent, ExtractionObserver, Extractor, InstrumentedExtractor,
    },
    fetcher::{FetchOptions, FetchPayload, FetchResult, FetchStatus, FetchTier, Fetcher},
    searcher::{SearchOutcome, Searcher},
    sink::RunSink,
};
pub use types::{
    config::{
        BudgetFetchConfig, DiscoveryConfig, ExtractionConfig, FastPathConfig, FastPathMode,
        FetchConfig, PipelineConfig,
    },
    entity::{EntityToImpute, RetainField},
    record::{
        Costs, FieldProvenance, Performance, RunRecord, RunStatus, StatusDetail, UrlState,
    },
};

// Re-export the pipeline
pub use pipeline::{
    aggregate, merge_fetch_results, validate_extractions, Aggregation, FastPathOutcome,
    FastPathService, ImputePipeline, QualitySignal,
};

// Re-export reference collaborators
pub use fetchers::{FetcherExt, HttpFetcher, RateLimitedFetcher};
pub use searchers::TavilySearcher;
