// src/vector_index.rs
use crate::error::RagError;
use crate::llm::EMBEDDING_DIMENSION;
use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;

const COLLECTION_NAME: &str = "course_embeddings";

/// One embedding per course, keyed by course id. Upsert replaces in place;
/// nearest-neighbor queries are ordered by ascending L2 distance.
#[async_trait]
pub trait CourseVectorIndex: Send + Sync {
    async fn upsert(&self, course_id: i64, vector: Vec<f32>) -> Result<(), RagError>;
    async fn query_nearest(&self, vector: &[f32], k: usize) -> Result<Vec<i64>, RagError>;
}

pub struct QdrantCourseIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantCourseIndex {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| RagError::VectorIndex(e.to_string()))?;

        Ok(Self {
            client,
            collection: COLLECTION_NAME.to_string(),
        })
    }

    /// Create the collection if it does not exist yet. An already-existing
    /// collection is fine.
    pub async fn ensure_collection(&self) -> Result<(), RagError> {
        let result = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(EMBEDDING_DIMENSION as u64, Distance::Euclid),
                ),
            )
            .await;

        match result {
            Ok(_) => {
                tracing::info!("Created Qdrant collection: {}", self.collection);
                Ok(())
            }
            Err(e) if e.to_string().contains("already exists") => {
                tracing::debug!("Qdrant collection '{}' already exists", self.collection);
                Ok(())
            }
            Err(e) => Err(RagError::VectorIndex(format!(
                "failed to create collection '{}': {}",
                self.collection, e
            ))),
        }
    }
}

#[async_trait]
impl CourseVectorIndex for QdrantCourseIndex {
    async fn upsert(&self, course_id: i64, vector: Vec<f32>) -> Result<(), RagError> {
        if vector.len() != EMBEDDING_DIMENSION {
            return Err(RagError::VectorIndex(format!(
                "expected {}-dimensional vector for course {}, got {}",
                EMBEDDING_DIMENSION,
                course_id,
                vector.len()
            )));
        }

        let payload = Payload::try_from(json!({ "course_id": course_id }))
            .map_err(|e| RagError::VectorIndex(e.to_string()))?;

        // Point id = course id, so re-indexing overwrites in place.
        let point = PointStruct::new(course_id as u64, vector, payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| RagError::VectorIndex(e.to_string()))?;

        tracing::debug!("Upserted embedding for course {}", course_id);
        Ok(())
    }

    async fn query_nearest(&self, vector: &[f32], k: usize) -> Result<Vec<i64>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(SearchPointsBuilder::new(
                &self.collection,
                vector.to_vec(),
                k as u64,
            ))
            .await
            .map_err(|e| RagError::VectorIndex(e.to_string()))?;

        let ids = response
            .result
            .into_iter()
            .filter_map(|point| match point.id.and_then(|id| id.point_id_options) {
                Some(PointIdOptions::Num(n)) => Some(n as i64),
                _ => None,
            })
            .collect();

        Ok(ids)
    }
}
