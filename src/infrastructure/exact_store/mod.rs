//! Exact-match store implementations

mod factory;
mod in_memory;
mod redis;

pub use factory::{create_exact_store, ExactStoreType};
pub use in_memory::InMemoryExactStore;
pub use redis::RedisExactStore;
