//! Deterministic local embedding via signed feature hashing

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::embedding::{
    l2_normalize, Embedding, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse,
};
use crate::domain::DomainError;

pub const DEFAULT_HASHING_DIMENSIONS: usize = 256;
const HASHING_MODEL: &str = "feature-hash-v2";

/// Weight of an adjacent-token pair relative to a single token
const BIGRAM_WEIGHT: f32 = 0.7;

/// Function words carrying no visual content
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "of", "over", "in", "on", "at", "to", "with", "and", "for", "by", "from",
    "into", "under", "is", "are", "this", "that",
];

/// Offline embedding provider for development and tests
///
/// Each content token, and each pair of adjacent content tokens, is hashed
/// with SHA-256 into one of `dimensions` buckets with a hash-derived sign, and
/// the result is L2-normalized. Prompts sharing most content words in the same
/// order score high. Swapping the roles of two words ("a cat chasing a dog"
/// against "a dog chasing a cat") changes every pair feature and drops the
/// score below typical thresholds. Disjoint vocabularies score near zero.
///
/// This is a lexical approximation with no notion of synonyms; production
/// deployments should configure a semantic embedding model.
#[derive(Debug, Clone)]
pub struct FeatureHashEmbeddingProvider {
    dimensions: usize,
}

impl FeatureHashEmbeddingProvider {
    pub fn new(dimensions: usize) -> Result<Self, DomainError> {
        if dimensions == 0 {
            return Err(DomainError::configuration(
                "Feature hash embedding dimensions must be positive",
            ));
        }

        Ok(Self { dimensions })
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .filter(|t| !STOP_WORDS.contains(&t.as_str()))
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());

        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };

        vector[bucket] += sign * weight;
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens: Vec<String> = Self::tokens(text).collect();

        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }

        // Tokens never contain spaces, so a pair cannot collide with a token
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut vector, &bigram, BIGRAM_WEIGHT);
        }

        l2_normalize(&mut vector);
        vector
    }
}

impl Default for FeatureHashEmbeddingProvider {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_HASHING_DIMENSIONS,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FeatureHashEmbeddingProvider {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError> {
        if let Some(requested) = request.dimensions() {
            if requested != self.dimensions {
                return Err(DomainError::validation(format!(
                    "Feature hash provider produces {} dimensions, {} requested",
                    self.dimensions, requested
                )));
            }
        }

        let data = request
            .inputs()
            .iter()
            .enumerate()
            .map(|(idx, text)| Embedding::new(idx, self.embed_text(text)))
            .collect();

        Ok(EmbeddingResponse::new(HASHING_MODEL, data))
    }

    fn provider_name(&self) -> &'static str {
        "hashing"
    }

    fn default_model(&self) -> &'static str {
        HASHING_MODEL
    }

    fn dimensions(&self, _model: &str) -> Option<usize> {
        Some(self.dimensions)
    }
}
