//! Embedding client used by the lookup and write paths

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::embedding::{EmbedError, EmbeddingProvider, EmbeddingRequest};
use crate::domain::DomainError;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300);
const DEFAULT_MAX_RETRIES: u32 = 1;

/// Wraps an embedding provider with a timeout, a small retry budget and
/// output validation
///
/// Every vector it returns has exactly `dimensions()` finite components and a
/// non-zero norm. Both the read and write paths embed through the same
/// client, so they share one model, one dimension and one representation.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    model: String,
    dimensions: usize,
    /// Sent to the provider when it differs from the model's native size
    requested_dimensions: Option<usize>,
    timeout: Duration,
    max_retries: u32,
    version: String,
}

impl EmbeddingClient {
    /// Create a client for `model`, or the provider's default model
    ///
    /// `dimensions` overrides the model's native size; it is required when the
    /// provider does not know the model.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        model: Option<String>,
        dimensions: Option<usize>,
    ) -> Result<Self, DomainError> {
        let model = model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| provider.default_model().to_string());
        let native = provider.dimensions(&model);

        let resolved = dimensions.or(native).ok_or_else(|| {
            DomainError::configuration(format!(
                "Unknown dimensions for embedding model '{}'; set embedding.dimensions",
                model
            ))
        })?;

        if resolved == 0 {
            return Err(DomainError::configuration(
                "Embedding dimensions must be positive",
            ));
        }

        let requested_dimensions = match (dimensions, native) {
            (Some(wanted), Some(native)) if wanted != native => Some(wanted),
            _ => None,
        };

        let version = format!("{}:{}:{}", provider.provider_name(), model, resolved);

        Ok(Self {
            provider,
            model,
            dimensions: resolved,
            requested_dimensions,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            version,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `provider:model:dimensions`; entries with another version are never compared
    pub fn embedding_version(&self) -> &str {
        &self.version
    }

    /// Embed canonical text, retrying transient failures at most `max_retries` times
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut attempt = 0;

        loop {
            match self.embed_once(text).await {
                Ok(vector) => return Ok(vector),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        provider = self.provider.provider_name(),
                        attempt = attempt,
                        error = %e,
                        "Embedding failed, retrying"
                    );
                }
                Err(e) => {
                    debug!(
                        provider = self.provider.provider_name(),
                        kind = e.kind(),
                        error = %e,
                        "Embedding failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut request = EmbeddingRequest::single(&self.model, text);
        if let Some(dims) = self.requested_dimensions {
            request = request.with_dimensions(dims);
        }

        let after_ms = self.timeout.as_millis() as u64;

        let response = match tokio::time::timeout(self.timeout, self.provider.embed(request)).await
        {
            Err(_) => return Err(EmbedError::Timeout { after_ms }),
            Ok(Err(DomainError::Timeout { .. })) => return Err(EmbedError::Timeout { after_ms }),
            Ok(Err(DomainError::Validation { message })) => {
                return Err(EmbedError::Malformed(message));
            }
            Ok(Err(e)) => return Err(EmbedError::Unavailable(e.to_string())),
            Ok(Ok(response)) => response,
        };

        let vector = response
            .take(0)
            .ok_or_else(|| EmbedError::Malformed("response contained no embedding".to_string()))?
            .into_vector();

        self.validate(vector)
    }

    fn validate(&self, vector: Vec<f32>) -> Result<Vec<f32>, EmbedError> {
        if vector.len() != self.dimensions {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }

        if vector.iter().any(|x| !x.is_finite()) {
            return Err(EmbedError::Malformed(
                "embedding contains non-finite values".to_string(),
            ));
        }

        if vector.iter().all(|x| *x == 0.0) {
            return Err(EmbedError::Malformed("embedding has zero norm".to_string()));
        }

        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::MockEmbeddingProvider;

    fn client(provider: MockEmbeddingProvider) -> (Arc<MockEmbeddingProvider>, EmbeddingClient) {
        let provider = Arc::new(provider);
        let client = EmbeddingClient::new(provider.clone(), None, None).unwrap();
        (provider, client)
    }

    #[tokio::test]
    async fn test_embed_success() {
        let (_, client) = client(MockEmbeddingProvider::new("mock", 3).with_vector("x", vec![0.0, 1.0, 0.0]));

        let vector = client.embed("x").await.unwrap();

        assert_eq!(vector, vec![0.0, 1.0, 0.0]);
        assert_eq!(client.embedding_version(), "mock:mock-embedding:3");
        assert_eq!(client.dimensions(), 3);
    }

    #[tokio::test]
    async fn test_retries_once_then_succeeds() {
        let (provider, client) = client(MockEmbeddingProvider::new("mock", 4).with_failures(1));

        assert!(client.embed("x").await.is_ok());
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let (provider, client) = client(MockEmbeddingProvider::new("mock", 4).with_failures(5));

        let err = client.embed("x").await.unwrap_err();

        assert!(matches!(err, EmbedError::Unavailable(_)));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_no_retries_when_disabled() {
        let provider = Arc::new(MockEmbeddingProvider::new("mock", 4).with_failures(1));
        let client = EmbeddingClient::new(provider.clone(), None, None)
            .unwrap()
            .with_max_retries(0);

        assert!(client.embed("x").await.is_err());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let provider = Arc::new(MockEmbeddingProvider::new("mock", 4).with_delay(Duration::from_millis(200)));
        let client = EmbeddingClient::new(provider, None, None)
            .unwrap()
            .with_timeout(Duration::from_millis(10))
            .with_max_retries(0);

        let err = client.embed("x").await.unwrap_err();

        assert_eq!(err, EmbedError::Timeout { after_ms: 10 });
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_not_retried() {
        let (provider, client) = client(MockEmbeddingProvider::new("mock", 3).with_vector("x", vec![1.0, 0.0]));

        let err = client.embed("x").await.unwrap_err();

        assert_eq!(err, EmbedError::DimensionMismatch { expected: 3, actual: 2 });
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_rejects_non_finite_and_zero_vectors() {
        let (_, client) = client(
            MockEmbeddingProvider::new("mock", 2)
                .with_vector("nan", vec![f32::NAN, 1.0])
                .with_vector("zero", vec![0.0, 0.0]),
        );

        assert!(matches!(client.embed("nan").await, Err(EmbedError::Malformed(_))));
        assert!(matches!(client.embed("zero").await, Err(EmbedError::Malformed(_))));
    }

    #[test]
    fn test_dimension_override_changes_version() {
        let provider = Arc::new(MockEmbeddingProvider::new("mock", 8));
        let client = EmbeddingClient::new(provider, Some("small".into()), Some(4)).unwrap();

        assert_eq!(client.model(), "small");
        assert_eq!(client.dimensions(), 4);
        assert_eq!(client.embedding_version(), "mock:small:4");
    }
}
