// src/config.rs
use crate::error::RagError;
use std::env;

/// Which embedding backend to use for course documents and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Gemini `text-embedding-004`, truncated to 384 dimensions.
    Gemini,
    /// Deterministic hash-based vectors. No network calls; useful for local
    /// runs without an API key.
    Hash,
}

/// Runtime settings, loaded once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub backend_url: String,
    pub gemini_api_key: String,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub bind_addr: String,
    pub embedding_provider: EmbeddingProvider,
}

impl Settings {
    pub fn from_env() -> Result<Self, RagError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| RagError::Config("DATABASE_URL must be set".to_string()))?;
        let gemini_api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| RagError::Config("GEMINI_API_KEY must be set".to_string()))?;

        let backend_url = env::var("BACKEND_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());
        let qdrant_url = env::var("QDRANT_URL")
            .unwrap_or_else(|_| "http://localhost:6334".to_string());
        let qdrant_api_key = env::var("QDRANT_API_KEY").ok().filter(|k| !k.is_empty());
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

        let embedding_provider = match env::var("EMBEDDING_PROVIDER").as_deref() {
            Ok("hash") => EmbeddingProvider::Hash,
            Ok("gemini") | Err(_) => EmbeddingProvider::Gemini,
            Ok(other) => {
                return Err(RagError::Config(format!(
                    "Unknown EMBEDDING_PROVIDER '{}' (expected 'gemini' or 'hash')",
                    other
                )))
            }
        };

        Ok(Self {
            database_url,
            backend_url,
            gemini_api_key,
            qdrant_url,
            qdrant_api_key,
            bind_addr,
            embedding_provider,
        })
    }
}
