//! Tavily-backed discovery implementation.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::security::SecretString;
use crate::traits::searcher::{SearchOutcome, Searcher};

/// Discovery via Tavily's search API.
pub struct TavilySearcher {
    api_key: SecretString,
    client: reqwest::Client,
    /// Flat cost attributed to each search call, for run accounting.
    pub cost_per_search: f64,
}

impl TavilySearcher {
    /// Create a new Tavily searcher.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key),
            client: reqwest::Client::new(),
            cost_per_search: 0.005,
        }
    }

    /// Set the per-search cost used for accounting.
    pub fn with_cost_per_search(mut self, cost: f64) -> Self {
        self.cost_per_search = cost;
        self
    }
}

#[async_trait]
impl Searcher for TavilySearcher {
    async fn search(&self, query: &str, result_count: usize) -> DiscoveryResult<SearchOutcome> {
        #[derive(serde::Serialize)]
        struct Request<'a> {
            query: &'a str,
            search_depth: &'a str,
            max_results: usize,
        }

        #[derive(serde::Deserialize)]
        struct Response {
            results: Vec<TavilyResult>,
        }

        #[derive(serde::Deserialize)]
        struct TavilyResult {
            url: String,
        }

        let request = Request {
            query,
            search_depth: "basic",
            max_results: result_count,
        };

        let response = self
            .client
            .post("https://api.tavily.com/search")
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .json(&request)
            .send()
            .await
            .map_err(|e| DiscoveryError::Backend(Box::new(e)))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DiscoveryError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(DiscoveryError::Backend(Box::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Tavily API error: {}", response.status()),
            ))));
        }

        let parsed: Response = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Backend(Box::new(e)))?;

        let links: Vec<String> = parsed
            .results
            .into_iter()
            .map(|r| r.url)
            .filter(|u| url::Url::parse(u).is_ok())
            .collect();

        let mut metadata = HashMap::new();
        metadata.insert("engine".to_string(), "tavily".to_string());

        Ok(SearchOutcome {
            total_results: links.len(),
            success: !links.is_empty(),
            links,
            cost: self.cost_per_search,
            metadata,
        })
    }
}
