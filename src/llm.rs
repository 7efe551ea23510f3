// src/llm.rs
use crate::error::RagError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Dimension of every course embedding stored in the vector index.
pub const EMBEDDING_DIMENSION: usize = 384;

/// Opaque prompt -> text function. Implemented by the Gemini client in
/// production and by scripted stubs in tests.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, RagError>;
}

/// Opaque text -> vector function. Must be deterministic: the same input
/// always yields the same vector.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;
}

/// Deterministic hash-based embedder.
///
/// Not a semantic embedding. It exists so the service can run end to end
/// without an embedding API: each 32-value block of the vector comes from a
/// SHA-256 chain over the input, normalized to [-1, 1].
pub struct HashEmbedder;

impl HashEmbedder {
    fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = Vec::with_capacity(EMBEDDING_DIMENSION);
        let mut block: u32 = 0;

        while vector.len() < EMBEDDING_DIMENSION {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(block.to_be_bytes());
            let digest = hasher.finalize();

            for byte in digest.iter() {
                if vector.len() == EMBEDDING_DIMENSION {
                    break;
                }
                vector.push((*byte as f32 - 128.0) / 128.0);
            }
            block += 1;
        }

        vector
    }
}

#[async_trait]
impl TextEmbedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(Self::vector_for(text))
    }
}
