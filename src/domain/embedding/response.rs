//! Embedding response types and vector math

use serde::{Deserialize, Serialize};

/// A single embedding vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// Index of this embedding in the batch
    index: usize,
    /// The embedding vector
    embedding: Vec<f32>,
}

impl Embedding {
    pub fn new(index: usize, embedding: Vec<f32>) -> Self {
        Self { index, embedding }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn vector(&self) -> &[f32] {
        &self.embedding
    }

    pub fn dimensions(&self) -> usize {
        self.embedding.len()
    }

    pub fn into_vector(self) -> Vec<f32> {
        self.embedding
    }
}

/// Response from an embedding request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// Model that produced the vectors
    model: String,
    /// Generated embeddings
    data: Vec<Embedding>,
}

impl EmbeddingResponse {
    pub fn new(model: impl Into<String>, data: Vec<Embedding>) -> Self {
        Self {
            model: model.into(),
            data,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.data
    }

    /// Take the embedding for batch position `index`, regardless of response order
    pub fn take(self, index: usize) -> Option<Embedding> {
        self.data.into_iter().find(|e| e.index() == index)
    }
}

/// Cosine similarity between two vectors
///
/// Returns 0.0 for empty, mismatched or zero-norm inputs so that such
/// candidates can never pass a similarity threshold.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Scale a vector to unit length in place; zero vectors are left untouched
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}
