//! Discovery trait - turning a query into candidate source URLs.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryResult;

/// Outcome of one discovery call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Candidate source URLs, best-first if the backend ranks them
    pub links: Vec<String>,

    /// Total hits the backend reported, which may exceed `links.len()`
    pub total_results: usize,

    /// What this search cost
    pub cost: f64,

    /// Whether the backend considered the search successful
    pub success: bool,

    /// Backend-specific extras (engine name, quota headroom, ...)
    pub metadata: HashMap<String, String>,
}

impl SearchOutcome {
    /// A successful outcome over a list of links.
    pub fn with_links(links: Vec<String>) -> Self {
        let total_results = links.len();
        Self {
            links,
            total_results,
            cost: 0.0,
            success: true,
            metadata: HashMap::new(),
        }
    }

    /// A failed outcome carrying a reason in the metadata.
    pub fn failed(reason: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("reason".to_string(), reason.into());
        Self {
            links: Vec::new(),
            total_results: 0,
            cost: 0.0,
            success: false,
            metadata,
        }
    }

    /// Set the cost.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

/// Discovery capability: search the web for candidate sources.
///
/// The coordinator treats `success == false` or an empty `links` list
/// as a hard discovery failure; an `Err` is treated the same way after
/// the configured retries are exhausted.
#[async_trait]
pub trait Searcher: Send + Sync {
    /// Search for up to `result_count` candidate URLs for the query.
    async fn search(&self, query: &str, result_count: usize) -> DiscoveryResult<SearchOutcome>;
}
