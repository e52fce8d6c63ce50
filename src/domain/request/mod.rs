//! Generation request canonicalization

mod bucket;
mod normalizer;
mod params;
mod validation;

pub use bucket::bucket;
pub use normalizer::{normalize, normalize_text, NormalizedRequest};
pub use params::RenderParams;
pub use validation::{
    validate_dimensions, validate_model_id, validate_request, RequestValidationError,
    MAX_DIMENSION, MAX_MODEL_ID_LENGTH,
};
