//! Cache metrics recorded through the `metrics` facade
//!
//! The library installs no exporter; the embedding application decides where
//! these go.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::domain::cache::LookupOutcome;

/// Record a finished lookup
pub fn record_lookup(outcome: &LookupOutcome, duration: Duration) {
    let (result, reason) = outcome_labels(outcome);
    let labels = [("outcome", result.to_string()), ("reason", reason.to_string())];

    counter!("media_cache_lookups_total", &labels).increment(1);
    histogram!("media_cache_lookup_duration_seconds", "outcome" => result)
        .record(duration.as_secs_f64());

    if let LookupOutcome::Hit(hit) = outcome {
        histogram!("media_cache_hit_similarity", "kind" => hit.kind.as_str())
            .record(hit.similarity as f64);
    }
}

/// Record the final status of one store write (`exact` or `vector`)
pub fn record_write(target: &'static str, status: &'static str) {
    counter!("media_cache_writes_total", "target" => target, "status" => status).increment(1);
}

/// Record entries removed by an eviction sweep
pub fn record_eviction(store: &'static str, count: usize) {
    if count == 0 {
        return;
    }

    counter!("media_cache_evictions_total", "store" => store).increment(count as u64);
}

/// Record index candidates dropped before scoring
pub fn record_discarded_candidates(reason: &'static str, count: usize) {
    if count == 0 {
        return;
    }

    counter!("media_cache_discarded_candidates_total", "reason" => reason)
        .increment(count as u64);
}

fn outcome_labels(outcome: &LookupOutcome) -> (&'static str, &'static str) {
    match outcome {
        LookupOutcome::Hit(hit) => ("hit", hit.kind.as_str()),
        LookupOutcome::Miss(reason) => ("miss", reason.as_str()),
    }
}
