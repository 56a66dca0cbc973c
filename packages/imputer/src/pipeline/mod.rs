//! The pipeline: coordinator, fast path, cost fallback, aggregation.
//!
//! The coordinator drives everything:
//! - fast path (optional short-circuit over known-good domains)
//! - discovery (query -> candidate URLs)
//! - streaming fetch + extract fan-out
//! - cost-aware budget re-fetch and merge
//! - validation and aggregation of extractions into one answer

pub mod aggregate;
pub mod coordinator;
pub mod fallback;
pub mod fast_path;

pub use aggregate::{aggregate, validate_extractions, Aggregation, QualitySignal};
pub use coordinator::ImputePipeline;
pub use fallback::{merge_fetch_results, urls_needing_fallback};
pub use fast_path::{FastPathOutcome, FastPathService};
