//! Cost-aware fallback merge policy.
//!
//! When the primary fetch pass spends past the configured ceiling, the
//! coordinator re-fetches the still-failed URLs on the budget tier and
//! merges the two passes. The merge itself is a pure function of the
//! two result maps; it must not depend on map iteration order.

use indexmap::IndexMap;

use crate::traits::fetcher::FetchResult;

/// Merge the primary and fallback fetch passes.
///
/// Per URL: keep the primary result if it succeeded; otherwise take the
/// fallback result if it succeeded; otherwise keep the primary (failed)
/// result. URLs only present in one pass are carried through as-is.
pub fn merge_fetch_results(
    primary: &IndexMap<String, FetchResult>,
    fallback: &IndexMap<String, FetchResult>,
) -> IndexMap<String, FetchResult> {
    let mut merged = IndexMap::with_capacity(primary.len());

    for (url, primary_result) in primary {
        let winner = if primary_result.is_ready() {
            primary_result
        } else {
            match fallback.get(url) {
                Some(fallback_result) if fallback_result.is_ready() => fallback_result,
                _ => primary_result,
            }
        };
        merged.insert(url.clone(), winner.clone());
    }

    for (url, fallback_result) in fallback {
        if !merged.contains_key(url) {
            merged.insert(url.clone(), fallback_result.clone());
        }
    }

    merged
}

/// URLs that did not reach a ready state and are worth retrying.
pub fn urls_needing_fallback(results: &IndexMap<String, FetchResult>) -> Vec<String> {
    results
        .iter()
        .filter(|(_, result)| !result.is_ready())
        .map(|(url, _)| url.clone())
        .collect()
}
