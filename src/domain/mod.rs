//! Domain layer - Core cache types, traits and validation

pub mod cache;
pub mod embedding;
pub mod error;
pub mod request;

pub use cache::{
    ArtifactRef, CacheEntry, CacheHit, CacheStats, EntryHash, ExactMatchStore, LookupOutcome,
    LookupResult, LookupState, LookupTrace, MatchKind, MissReason, RetryConfig, ScopeFilter,
    ScoredEntry, SemanticCacheConfig, SimilarityQuery, UpsertOutcome, VectorIndex,
};
pub use embedding::{EmbedError, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
pub use error::DomainError;
pub use request::{
    bucket, normalize, validate_request, NormalizedRequest, RenderParams, RequestValidationError,
};
