//! Term Prober - drops candidate terms the graph has never heard of
//!
//! Probing is fail-open: a probe that errors keeps its term, and if every
//! candidate is rejected the unfiltered candidates are used instead.

use super::executor::QueryExecutor;
use crate::errors::Result;
use crate::metrics;
use futures::future::join_all;
use std::fmt::Display;
use tracing::{debug, warn};

/// Keep terms for which `exists` holds, in order, up to `max_terms`.
///
/// An `Err` from `exists` counts as true. When nothing survives, falls back
/// to the first `max_terms` candidates.
pub fn probe_filter<F, E>(terms: &[String], mut exists: F, max_terms: usize) -> Vec<String>
where
    F: FnMut(&str) -> std::result::Result<bool, E>,
    E: Display,
{
    let mut kept = Vec::new();
    for term in terms {
        if kept.len() >= max_terms {
            break;
        }
        let found = exists(term).unwrap_or_else(|e| {
            warn!(term = %term, error = %e, "Probe failed, keeping term");
            true
        });
        if found {
            kept.push(term.clone());
        }
    }

    if kept.is_empty() {
        terms.iter().take(max_terms).cloned().collect()
    } else {
        kept
    }
}

/// Count each probe as "hit", "miss" or "error"
fn record_outcomes(outcomes: &[Result<bool>]) {
    for outcome in outcomes {
        metrics::record_probe(match outcome {
            Ok(true) => "hit",
            Ok(false) => "miss",
            Err(_) => "error",
        });
    }
}

/// Probe every candidate concurrently, then filter in candidate order
pub async fn probe_candidates(executor: &QueryExecutor, candidates: &[String], max_terms: usize) -> Vec<String> {
    if candidates.is_empty() || max_terms == 0 {
        return Vec::new();
    }

    let outcomes = join_all(candidates.iter().map(|term| executor.check_term(term))).await;
    record_outcomes(&outcomes);
    let mut outcomes = outcomes.into_iter();

    let kept = probe_filter(
        candidates,
        |_| outcomes.next().unwrap_or(Ok(true)),
        max_terms,
    );
    debug!(candidates = candidates.len(), kept = kept.len(), "Term probing complete");
    kept
}
