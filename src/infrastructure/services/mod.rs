//! Lookup and write orchestration

mod cache_writer;
mod decision_engine;
mod media_cache_service;
mod recency;

pub use cache_writer::{CacheWriter, WriteReport, WriteStatus};
pub use decision_engine::DecisionEngine;
pub use media_cache_service::MediaCacheService;
