//! Embedding provider trait definition

use async_trait::async_trait;
use std::fmt::Debug;

use super::{EmbeddingRequest, EmbeddingResponse};
use crate::domain::DomainError;

/// Trait for embedding model services (OpenAI-compatible HTTP, local hashing, ...)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Generate embeddings for the given input
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;

    /// Get the default model for this provider
    fn default_model(&self) -> &'static str;

    /// Get the embedding dimensions for a model, if known
    fn dimensions(&self, model: &str) -> Option<usize>;
}
