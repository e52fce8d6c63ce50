//! Request validation at the cache boundary

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use super::params::RenderParams;

/// Maximum length for model IDs
pub const MAX_MODEL_ID_LENGTH: usize = 128;

/// Maximum accepted width or height in pixels
pub const MAX_DIMENSION: u32 = 16_384;

/// Model IDs: alphanumeric start, then alphanumerics and `._:/-`
static MODEL_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:/-]*$").unwrap());

/// Request validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum RequestValidationError {
    /// Prompt is empty after trimming
    EmptyPrompt,
    /// Width or height is zero
    ZeroDimension { width: u32, height: u32 },
    /// Width or height exceeds the maximum
    DimensionTooLarge { width: u32, height: u32, max: u32 },
    /// Model ID is empty
    EmptyModelId,
    /// Model ID exceeds maximum length
    ModelIdTooLong { length: usize, max: usize },
    /// Model ID contains invalid characters
    InvalidModelId { id: String },
}

impl fmt::Display for RequestValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPrompt => write!(f, "Prompt cannot be empty"),
            Self::ZeroDimension { width, height } => {
                write!(f, "Invalid resolution {}x{}: dimensions must be positive", width, height)
            }
            Self::DimensionTooLarge { width, height, max } => {
                write!(
                    f,
                    "Invalid resolution {}x{}: dimensions cannot exceed {}",
                    width, height, max
                )
            }
            Self::EmptyModelId => write!(f, "Model ID cannot be empty"),
            Self::ModelIdTooLong { length, max } => {
                write!(f, "Model ID too long: {} characters (max {})", length, max)
            }
            Self::InvalidModelId { id } => write!(f, "Invalid model ID format '{}'", id),
        }
    }
}

impl std::error::Error for RequestValidationError {}

/// Validate a lookup or store request before normalization
pub fn validate_request(
    prompt: &str,
    params: &RenderParams,
    model_id: &str,
) -> Result<(), RequestValidationError> {
    if prompt.trim().is_empty() {
        return Err(RequestValidationError::EmptyPrompt);
    }

    validate_dimensions(params.width, params.height)?;
    validate_model_id(model_id.trim())
}

/// Validate a resolution
pub fn validate_dimensions(width: u32, height: u32) -> Result<(), RequestValidationError> {
    if width == 0 || height == 0 {
        return Err(RequestValidationError::ZeroDimension { width, height });
    }

    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(RequestValidationError::DimensionTooLarge {
            width,
            height,
            max: MAX_DIMENSION,
        });
    }

    Ok(())
}

/// Validate a model ID
pub fn validate_model_id(id: &str) -> Result<(), RequestValidationError> {
    if id.is_empty() {
        return Err(RequestValidationError::EmptyModelId);
    }

    if id.len() > MAX_MODEL_ID_LENGTH {
        return Err(RequestValidationError::ModelIdTooLong {
            length: id.len(),
            max: MAX_MODEL_ID_LENGTH,
        });
    }

    if !MODEL_ID_PATTERN.is_match(id) {
        return Err(RequestValidationError::InvalidModelId { id: id.to_string() });
    }

    Ok(())
}
