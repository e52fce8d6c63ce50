use thiserror::Error;

/// Failure of a single embed call as seen by the cache
///
/// Every variant means "semantic lookup unavailable" to the decision engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbedError {
    #[error("Embedding timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Embedding model unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed embedding output: {0}")]
    Malformed(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbedError {
    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::Malformed(_) => "malformed",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
        }
    }

    /// Malformed output is deterministic for a given input; retrying won't help
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable(_))
    }
}
