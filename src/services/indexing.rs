// src/services/indexing.rs
use crate::error::RagError;
use crate::llm::TextEmbedder;
use crate::vector_index::CourseVectorIndex;
use serde::Deserialize;
use std::sync::Arc;

/// Indexing request as sent by the backend when a course is created or
/// updated.
#[derive(Debug, Deserialize)]
pub struct IndexCourseRequest {
    pub course_id: i64,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty_level: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub modules: Vec<ModuleInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ModuleInfo {
    #[serde(default)]
    pub title: Option<String>,
}

/// Turns a course into a document, embeds it, and upserts the vector under
/// the course id. Re-indexing overwrites; it never duplicates.
pub struct IndexingService {
    embedder: Arc<dyn TextEmbedder>,
    index: Arc<dyn CourseVectorIndex>,
}

impl IndexingService {
    pub fn new(embedder: Arc<dyn TextEmbedder>, index: Arc<dyn CourseVectorIndex>) -> Self {
        Self { embedder, index }
    }

    pub async fn index_course(&self, request: &IndexCourseRequest) -> Result<(), RagError> {
        let document = build_course_document(request);
        tracing::info!(
            "Indexing course {}: {}",
            request.course_id,
            request.name
        );

        let vector = self.embedder.embed(&document).await?;
        self.index.upsert(request.course_id, vector).await
    }
}

/// Document text fed to the embedder, one sentence-like clause per field.
fn build_course_document(request: &IndexCourseRequest) -> String {
    let mut parts = Vec::new();

    if !request.name.is_empty() {
        parts.push(format!("Title: {}", request.name));
    }
    if !request.description.is_empty() {
        parts.push(format!("Description: {}", request.description));
    }
    if let Some(category) = &request.category {
        parts.push(format!("Category: {}", category));
    }
    if let Some(level) = &request.difficulty_level {
        parts.push(format!("Level: {}", level));
    }
    if !request.tags.is_empty() {
        parts.push(format!("Tags: {}", request.tags.join(", ")));
    }

    let module_titles: Vec<&str> = request
        .modules
        .iter()
        .filter_map(|m| m.title.as_deref())
        .filter(|t| !t.is_empty())
        .collect();
    if !module_titles.is_empty() {
        parts.push(format!("Modules: {}", module_titles.join(", ")));
    }

    parts.join(". ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashEmbedder;
    use crate::test_support::InMemoryVectorIndex;

    fn request(course_id: i64) -> IndexCourseRequest {
        IndexCourseRequest {
            course_id,
            name: "Intro to Rust".to_string(),
            description: "Ownership from scratch".to_string(),
            category: Some("Programming".to_string()),
            difficulty_level: Some("Beginner".to_string()),
            tags: vec!["rust".to_string(), "systems".to_string()],
            modules: vec![
                ModuleInfo {
                    title: Some("Getting started".to_string()),
                },
                ModuleInfo { title: None },
            ],
        }
    }

    #[test]
    fn document_concatenates_populated_fields() {
        let document = build_course_document(&request(1));
        assert_eq!(
            document,
            "Title: Intro to Rust. Description: Ownership from scratch. \
             Category: Programming. Level: Beginner. Tags: rust, systems. \
             Modules: Getting started"
        );
    }

    #[test]
    fn document_skips_empty_fields() {
        let request = IndexCourseRequest {
            course_id: 1,
            name: "Bare".to_string(),
            description: String::new(),
            category: None,
            difficulty_level: None,
            tags: vec![],
            modules: vec![],
        };
        assert_eq!(build_course_document(&request), "Title: Bare");
    }

    #[tokio::test]
    async fn reindexing_keeps_a_single_record() {
        let index = Arc::new(InMemoryVectorIndex::new());
        let service = IndexingService::new(Arc::new(HashEmbedder), index.clone());

        service.index_course(&request(42)).await.unwrap();
        service.index_course(&request(42)).await.unwrap();

        assert_eq!(index.len(), 1);
    }
}
