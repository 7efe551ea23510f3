// src/error.rs
use thiserror::Error;

/// Error taxonomy for the RAG pipeline.
///
/// None of these are allowed to escape the HTTP surface as a hard failure:
/// the orchestrators catch them and degrade to a well-formed response.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Course catalog fetch failed: {0}")]
    ExternalFetch(String),
    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),
    #[error("Failed to parse model response: {0}")]
    ResponseParse(String),
    #[error("Vector index error: {0}")]
    VectorIndex(String),
    #[error("Embedding error: {0}")]
    Embedding(String),
    #[error("Course {0} not found")]
    CourseNotFound(i64),
    #[error("Configuration error: {0}")]
    Config(String),
}
