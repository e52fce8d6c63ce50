//! Embedding request types

use serde::{Deserialize, Serialize};

/// Request to generate embeddings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Model to use for embedding
    model: String,
    /// Input texts, embedded in order
    inputs: Vec<String>,
    /// Requested output dimensions (for models that support truncation)
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

impl EmbeddingRequest {
    /// Create a request for a single text
    pub fn single(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            inputs: vec![text.into()],
            dimensions: None,
        }
    }

    /// Create a request for multiple texts
    pub fn batch(model: impl Into<String>, texts: Vec<String>) -> Self {
        Self {
            model: model.into(),
            inputs: texts,
            dimensions: None,
        }
    }

    /// Set the output dimensions
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_request() {
        let request = EmbeddingRequest::single("text-embedding-3-small", "a red car");

        assert_eq!(request.model(), "text-embedding-3-small");
        assert_eq!(request.inputs(), &["a red car".to_string()]);
        assert_eq!(request.dimensions(), None);
    }

    #[test]
    fn test_batch_request_with_dimensions() {
        let request =
            EmbeddingRequest::batch("m", vec!["a".into(), "b".into()]).with_dimensions(256);

        assert_eq!(request.inputs().len(), 2);
        assert_eq!(request.dimensions(), Some(256));
    }
}
