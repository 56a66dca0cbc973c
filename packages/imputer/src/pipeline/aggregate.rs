//! Result aggregation - combining per-URL extractions into one answer.
//!
//! Sources carry no explicit confidence score, so extraction elapsed
//! time and the backend's token-reduction ratio stand in as quality
//! proxies: faster extraction and higher reduction both correlate with
//! cleaner source pages. If the extraction backend ever reports a real
//! confidence score, it should replace this proxy outright.

use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::traits::extractor::ExtractResult;
use crate::types::entity::RetainField;
use crate::types::record::FieldProvenance;

/// Quality proxy for one extraction source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualitySignal {
    pub elapsed: Duration,
    pub reduction_ratio: Option<f64>,
}

impl QualitySignal {
    /// Strictly-better comparison: lower elapsed wins; an exact tie
    /// falls through to higher reduction ratio.
    pub fn better_than(&self, other: &QualitySignal) -> bool {
        if self.elapsed != other.elapsed {
            return self.elapsed < other.elapsed;
        }
        self.reduction_ratio.unwrap_or(0.0) > other.reduction_ratio.unwrap_or(0.0)
    }
}

/// The combined answer plus per-field provenance.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub fields: IndexMap<String, Value>,
    pub provenance: IndexMap<String, FieldProvenance>,
    pub source_urls: Vec<String>,
}

/// Filter extractions down to the ones usable for aggregation:
/// successful, non-empty, and at or above the completeness threshold.
pub fn validate_extractions(
    results: &IndexMap<String, ExtractResult>,
    schema: &[RetainField],
    completeness_threshold: f64,
) -> Vec<(String, ExtractResult)> {
    results
        .iter()
        .filter(|(url, result)| {
            if !result.success {
                return false;
            }
            if result.filled_field_count() == 0 {
                debug!(url = %url, "excluding empty extraction from aggregation");
                return false;
            }
            let completeness = result.completeness(schema);
            if completeness < completeness_threshold {
                debug!(
                    url = %url,
                    completeness,
                    threshold = completeness_threshold,
                    "excluding sub-threshold extraction from aggregation"
                );
                return false;
            }
            true
        })
        .map(|(url, result)| (url.clone(), result.clone()))
        .collect()
}

/// Combine validated extractions into one field-value map.
///
/// Sources are visited in ascending extraction time (tie: higher
/// reduction ratio, then URL for stability), so the output is the same
/// regardless of the completion order the sources arrived in. A field
/// already set is only overridden by a strictly better source.
pub fn aggregate(validated: &[(String, ExtractResult)]) -> Aggregation {
    let mut ordered: Vec<&(String, ExtractResult)> = validated.iter().collect();
    ordered.sort_by(|(url_a, a), (url_b, b)| {
        a.elapsed
            .cmp(&b.elapsed)
            .then_with(|| {
                b.reduction_ratio
                    .unwrap_or(0.0)
                    .partial_cmp(&a.reduction_ratio.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| url_a.cmp(url_b))
    });

    let mut aggregation = Aggregation::default();

    for (url, result) in ordered {
        let Some(content) = &result.content else {
            continue;
        };
        let signal = QualitySignal {
            elapsed: result.elapsed,
            reduction_ratio: result.reduction_ratio,
        };

        aggregation.source_urls.push(url.clone());

        for (field, value) in content {
            if !ExtractResult::is_filled(value) {
                continue;
            }
            let current_wins = match aggregation.provenance.get(field) {
                None => true,
                Some(existing) => signal.better_than(&QualitySignal {
                    elapsed: existing.elapsed,
                    reduction_ratio: existing.reduction_ratio,
                }),
            };
            if current_wins {
                aggregation.fields.insert(field.clone(), value.clone());
                aggregation.provenance.insert(
                    field.clone(),
                    FieldProvenance {
                        source_url: url.clone(),
                        elapsed: result.elapsed,
                        reduction_ratio: result.reduction_ratio,
                    },
                );
            }
        }
    }

    aggregation
}
