//! Embedding provider domain models and traits

mod error;
mod provider;
mod request;
mod response;

pub use error::EmbedError;
pub use provider::EmbeddingProvider;
pub use request::EmbeddingRequest;
pub use response::{cosine_similarity, l2_normalize, Embedding, EmbeddingResponse};

#[cfg(test)]
pub use provider::mock::MockEmbeddingProvider;
