//! Vector index implementations

mod factory;
mod in_memory;
mod pgvector;

pub use factory::{create_vector_index, VectorIndexType};
pub use in_memory::InMemoryVectorIndex;
pub use pgvector::{PgvectorIndex, PgvectorIndexConfig};
