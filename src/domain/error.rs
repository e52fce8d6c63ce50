use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Vector index error: {message}")]
    VectorIndex { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Timed out after {after_ms}ms: {operation}")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn vector_index(message: impl Into<String>) -> Self {
        Self::VectorIndex {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after_ms,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the failed operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. }
                | Self::Cache { .. }
                | Self::VectorIndex { .. }
                | Self::Storage { .. }
                | Self::Timeout { .. }
        )
    }
}
