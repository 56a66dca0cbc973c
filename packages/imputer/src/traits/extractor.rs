//! Extraction trait - turning raw content plus a field schema into
//! structured values.
//!
//! Also home to `InstrumentedExtractor`, a wrapper that emits lifecycle
//! events to an observer around every call. Observation is explicit
//! composition; extractor methods are never substituted at runtime.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ExtractOpResult;
use crate::traits::fetcher::FetchPayload;
use crate::types::entity::RetainField;

/// Outcome of one extraction call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResult {
    /// Extracted field name -> value, when extraction succeeded
    pub content: Option<IndexMap<String, Value>>,

    /// Whether the backend considered the extraction successful
    pub success: bool,

    /// What this extraction cost
    pub cost: f64,

    /// Wall-clock time the extraction took
    pub elapsed: Duration,

    /// Input-to-output token reduction reported by the backend, when
    /// available. Higher means the source was denser in signal.
    pub reduction_ratio: Option<f64>,

    /// Error message on failure
    pub error: Option<String>,
}

impl ExtractResult {
    /// A successful extraction over a field map.
    pub fn succeeded(content: IndexMap<String, Value>) -> Self {
        Self {
            content: Some(content),
            success: true,
            cost: 0.0,
            elapsed: Duration::ZERO,
            reduction_ratio: None,
            error: None,
        }
    }

    /// A failed extraction with an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            content: None,
            success: false,
            cost: 0.0,
            elapsed: Duration::ZERO,
            reduction_ratio: None,
            error: Some(error.into()),
        }
    }

    /// Set the cost.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Set the elapsed time.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Set the reduction ratio.
    pub fn with_reduction_ratio(mut self, ratio: f64) -> Self {
        self.reduction_ratio = Some(ratio);
        self
    }

    /// Whether a value counts as filled for completeness purposes.
    /// Nulls, blank strings, and empty collections do not.
    pub fn is_filled(value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            _ => true,
        }
    }

    /// Number of filled fields in the output.
    pub fn filled_field_count(&self) -> usize {
        self.content
            .as_ref()
            .map(|c| c.values().filter(|v| Self::is_filled(v)).count())
            .unwrap_or(0)
    }

    /// Fraction of schema fields with filled values. An empty schema
    /// counts as fully complete.
    pub fn completeness(&self, schema: &[RetainField]) -> f64 {
        if schema.is_empty() {
            return 1.0;
        }
        let filled = self
            .content
            .as_ref()
            .map(|content| {
                schema
                    .iter()
                    .filter(|field| {
                        content
                            .get(&field.name)
                            .map(Self::is_filled)
                            .unwrap_or(false)
                    })
                    .count()
            })
            .unwrap_or(0);
        filled as f64 / schema.len() as f64
    }
}

/// Extraction capability: structured field values out of raw content.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract the schema's fields from the content.
    async fn extract(
        &self,
        content: &FetchPayload,
        schema: &[RetainField],
    ) -> ExtractOpResult<ExtractResult>;
}

/// Lifecycle events emitted around extraction calls.
#[derive(Debug, Clone)]
pub enum ExtractionEvent {
    /// An extraction call is about to run.
    Started { content_size: usize, field_count: usize },

    /// An extraction call finished (success or failure).
    Finished {
        success: bool,
        elapsed: Duration,
        cost: f64,
    },
}

/// Sink for extraction lifecycle events.
pub trait ExtractionObserver: Send + Sync {
    /// Receive one event. Must not block.
    fn on_event(&self, event: &ExtractionEvent);
}

/// An extractor wrapper that reports lifecycle events to an observer.
pub struct InstrumentedExtractor<X: Extractor> {
    inner: X,
    observer: Arc<dyn ExtractionObserver>,
}

impl<X: Extractor> InstrumentedExtractor<X> {
    /// Wrap an extractor with an observer.
    pub fn new(inner: X, observer: Arc<dyn ExtractionObserver>) -> Self {
        Self { inner, observer }
    }
}

#[async_trait]
impl<X: Extractor> Extractor for InstrumentedExtractor<X> {
    async fn extract(
        &self,
        content: &FetchPayload,
        schema: &[RetainField],
    ) -> ExtractOpResult<ExtractResult> {
        self.observer.on_event(&ExtractionEvent::Started {
            content_size: content.size(),
            field_count: schema.len(),
        });

        let outcome = self.inner.extract(content, schema).await;

        match &outcome {
            Ok(result) => self.observer.on_event(&ExtractionEvent::Finished {
                success: result.success,
                elapsed: result.elapsed,
                cost: result.cost,
            }),
            Err(e) => {
                debug!(error = %e, "extraction call errored");
                self.observer.on_event(&ExtractionEvent::Finished {
                    success: false,
                    elapsed: Duration::ZERO,
                    cost: 0.0,
                });
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Vec<RetainField> {
        vec![
            RetainField::new("a", "field a"),
            RetainField::new("b", "field b"),
            RetainField::new("c", "field c"),
            RetainField::new("d", "field d"),
        ]
    }

    #[test]
    fn test_completeness() {
        let mut content = IndexMap::new();
        content.insert("a".to_string(), json!("value"));
        content.insert("b".to_string(), json!(""));
        content.insert("c".to_string(), json!(null));

        let result = ExtractResult::succeeded(content);
        assert!((result.completeness(&schema()) - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_completeness_empty_schema() {
        let result = ExtractResult::succeeded(IndexMap::new());
        assert!((result.completeness(&[]) - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_instrumented_extractor_emits_events() {
        use crate::testing::{MockExtractor, RecordingObserver};

        let observer = RecordingObserver::new();
        let extractor = InstrumentedExtractor::new(
            MockExtractor::new().with_fields("page", &[("a", "1")]),
            Arc::new(observer.clone()),
        );

        let result = extractor
            .extract(&FetchPayload::Html("page content".into()), &schema())
            .await
            .unwrap();
        assert!(result.success);

        let events = observer.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            ExtractionEvent::Started { field_count: 4, .. }
        ));
        assert!(matches!(
            events[1],
            ExtractionEvent::Finished { success: true, .. }
        ));
    }

    #[test]
    fn test_is_filled() {
        assert!(ExtractResult::is_filled(&json!("x")));
        assert!(ExtractResult::is_filled(&json!(0)));
        assert!(ExtractResult::is_filled(&json!(false)));
        assert!(!ExtractResult::is_filled(&json!("  ")));
        assert!(!ExtractResult::is_filled(&json!(null)));
        assert!(!ExtractResult::is_filled(&json!([])));
        assert!(!ExtractResult::is_filled(&json!({})));
    }
}
