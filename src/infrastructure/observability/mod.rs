//! Observability infrastructure - cache metrics

mod metrics;

pub use metrics::{record_discarded_candidates, record_eviction, record_lookup, record_write};
