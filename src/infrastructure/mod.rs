//! Infrastructure layer - Store, index and embedding adapters plus services

pub mod embedding;
pub mod exact_store;
pub mod http_client;
pub mod logging;
pub mod observability;
pub mod services;
pub mod vector_index;
