//! Typed errors for the imputation pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. The coordinator contains
//! failures at the smallest unit it can: per-URL errors never abort the
//! run, and every failure is also appended to the run record's `errors`
//! list as a human-readable audit entry.

use thiserror::Error;

/// Top-level errors for pipeline operations.
#[derive(Debug, Error)]
pub enum ImputeError {
    /// Entity validation failed (e.g. blank name)
    #[error("invalid entity: {reason}")]
    InvalidEntity { reason: String },

    /// Discovery stage failed
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Fetch stage failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Extraction stage failed
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Persistence sink failed to store a finished record
    #[error("sink error: {0}")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from the discovery collaborator.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Search backend unavailable or returned an error
    #[error("search backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Search completed but produced no candidate links
    #[error("no results for query: {query}")]
    NoResults { query: String },

    /// Search backend rejected the request due to rate limits
    #[error("search rate limit exceeded")]
    RateLimited,
}

/// Errors from the fetch collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// URL could not be parsed
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Fetch exceeded its poll timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Content came back smaller than the configured floor
    #[error("undersized content from {url}: {size} < {min}")]
    Undersized { url: String, size: usize, min: usize },
}

/// Errors from the extraction collaborator.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Extraction backend unavailable or returned an error
    #[error("extraction backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Extraction exceeded its configured timeout
    #[error("extraction timed out")]
    Timeout,

    /// No content was provided to extract from
    #[error("no content to extract from")]
    EmptyContent,
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, ImputeError>;

/// Result type alias for discovery operations.
pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;

/// Result type alias for fetch operations.
pub type FetchOpResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for extraction operations.
pub type ExtractOpResult<T> = std::result::Result<T, ExtractError>;
