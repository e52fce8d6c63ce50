//! Embedding provider implementations and client construction

mod client;
mod hashing;
mod openai;

use std::sync::Arc;

pub use client::EmbeddingClient;
pub use hashing::{FeatureHashEmbeddingProvider, DEFAULT_HASHING_DIMENSIONS};
pub use openai::OpenAiEmbeddingProvider;

use crate::config::EmbeddingConfig;
use crate::domain::{DomainError, EmbeddingProvider, SemanticCacheConfig};
use crate::infrastructure::http_client::HttpClient;

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingProviderType {
    /// Local feature hashing, no network
    #[default]
    Hashing,
    /// OpenAI-compatible `/v1/embeddings` endpoint
    OpenAi,
}

impl std::fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hashing => write!(f, "hashing"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hashing" | "feature_hash" | "local" => Ok(Self::Hashing),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            _ => Err(DomainError::configuration(format!(
                "Unknown embedding provider: {}. Valid providers: hashing, openai",
                s
            ))),
        }
    }
}

/// Build the embedding client described by the configuration
pub fn create_embedding_client(
    config: &EmbeddingConfig,
    cache: &SemanticCacheConfig,
) -> Result<EmbeddingClient, DomainError> {
    let provider_type: EmbeddingProviderType = config.provider.parse()?;

    let provider: Arc<dyn EmbeddingProvider> = match provider_type {
        EmbeddingProviderType::Hashing => {
            tracing::warn!(
                "Using the lexical feature-hash embedder; paraphrases with different words \
                 will miss. Configure a semantic embedding provider for production"
            );
            Arc::new(FeatureHashEmbeddingProvider::new(
                config.dimensions.unwrap_or(DEFAULT_HASHING_DIMENSIONS),
            )?)
        }
        EmbeddingProviderType::OpenAi => {
            let http = HttpClient::with_timeout(cache.embedding_timeout())?;
            let api_key = config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());

            match &config.base_url {
                Some(url) => Arc::new(OpenAiEmbeddingProvider::with_base_url(http, api_key, url)),
                None => Arc::new(OpenAiEmbeddingProvider::new(http, api_key)),
            }
        }
    };

    tracing::info!(
        provider = %provider_type,
        model = config.model.as_deref().unwrap_or(provider.default_model()),
        "Embedding provider configured"
    );

    Ok(
        EmbeddingClient::new(provider, config.model.clone(), config.dimensions)?
            .with_timeout(cache.embedding_timeout())
            .with_max_retries(config.max_retries),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_from_str() {
        assert_eq!("hashing".parse::<EmbeddingProviderType>().unwrap(), EmbeddingProviderType::Hashing);
        assert_eq!("OpenAI".parse::<EmbeddingProviderType>().unwrap(), EmbeddingProviderType::OpenAi);
        assert!("bert".parse::<EmbeddingProviderType>().is_err());
    }

    #[test]
    fn test_create_hashing_client() {
        let config = EmbeddingConfig::default();
        let client = create_embedding_client(&config, &SemanticCacheConfig::default()).unwrap();

        assert_eq!(client.dimensions(), DEFAULT_HASHING_DIMENSIONS);
        assert_eq!(client.embedding_version(), "hashing:feature-hash-v2:256");
    }

    #[test]
    fn test_create_openai_client_with_unknown_model_needs_dimensions() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            model: Some("self-hosted-embed".into()),
            base_url: Some("http://localhost:9000".into()),
            ..Default::default()
        };

        assert!(create_embedding_client(&config, &SemanticCacheConfig::default()).is_err());

        let config = EmbeddingConfig {
            dimensions: Some(384),
            ..config
        };
        let client = create_embedding_client(&config, &SemanticCacheConfig::default()).unwrap();
        assert_eq!(client.embedding_version(), "openai:self-hosted-embed:384");
    }
}
