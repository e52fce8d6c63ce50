//! OpenAI-compatible embedding provider

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::embedding::{
    Embedding, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse,
};
use crate::domain::DomainError;
use crate::infrastructure::http_client::HttpClientTrait;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Known OpenAI embedding models and their native dimensions
const EMBEDDING_MODELS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
];

/// Embedding provider speaking the OpenAI `/v1/embeddings` protocol
///
/// Works against OpenAI itself and self-hosted servers exposing the same API.
/// Vectors are always requested as floats so write-time and query-time
/// embeddings share one representation.
#[derive(Debug)]
pub struct OpenAiEmbeddingProvider<C: HttpClientTrait> {
    client: C,
    auth_header: Option<String>,
    base_url: String,
}

impl<C: HttpClientTrait> OpenAiEmbeddingProvider<C> {
    pub fn new(client: C, api_key: Option<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_OPENAI_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        api_key: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let auth_header = api_key
            .filter(|key| !key.is_empty())
            .map(|key| format!("Bearer {}", key));
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            client,
            auth_header,
            base_url,
        }
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.base_url)
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        let mut headers = vec![("Content-Type", "application/json")];

        if let Some(ref auth) = self.auth_header {
            headers.push(("Authorization", auth.as_str()));
        }

        headers
    }

    fn build_body(&self, request: &EmbeddingRequest) -> serde_json::Value {
        let input = match request.inputs() {
            [single] => serde_json::json!(single),
            many => serde_json::json!(many),
        };

        let mut body = serde_json::json!({
            "model": request.model(),
            "input": input,
            "encoding_format": "float",
        });

        if let Some(dims) = request.dimensions() {
            body["dimensions"] = serde_json::json!(dims);
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<EmbeddingResponse, DomainError> {
        let response: WireEmbeddingResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::provider("openai", format!("Failed to parse embedding response: {}", e))
        })?;

        let mut data: Vec<Embedding> = response
            .data
            .into_iter()
            .map(|d| Embedding::new(d.index, d.embedding))
            .collect();
        data.sort_by_key(|e| e.index());

        Ok(EmbeddingResponse::new(response.model, data))
    }
}

#[async_trait]
impl<C: HttpClientTrait> EmbeddingProvider for OpenAiEmbeddingProvider<C> {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError> {
        if request.inputs().is_empty() {
            return Err(DomainError::validation("Embedding request has no input"));
        }

        let body = self.build_body(&request);
        let response = self
            .client
            .post_json(&self.embeddings_url(), self.headers(), &body)
            .await?;

        self.parse_response(response)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn default_model(&self) -> &'static str {
        "text-embedding-3-small"
    }

    fn dimensions(&self, model: &str) -> Option<usize> {
        EMBEDDING_MODELS
            .iter()
            .find(|(name, _)| *name == model)
            .map(|(_, dims)| *dims)
    }
}

#[derive(Debug, Deserialize)]
struct WireEmbeddingResponse {
    #[serde(default)]
    model: String,
    data: Vec<WireEmbedding>,
}

#[derive(Debug, Deserialize)]
struct WireEmbedding {
    index: usize,
    embedding: Vec<f32>,
}
