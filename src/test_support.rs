// src/test_support.rs
//
// Trait test doubles shared by the unit tests.
use crate::backend_client::{CourseCatalog, CourseDetails};
use crate::error::RagError;
use crate::llm::{ChatModel, EMBEDDING_DIMENSION};
use crate::memory::{MemorySnapshot, MemoryStore};
use crate::vector_index::CourseVectorIndex;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Pad a short prefix out to a full-dimension embedding vector.
pub fn padded_vector(head: &[f32]) -> Vec<f32> {
    let mut vector = head.to_vec();
    vector.resize(EMBEDDING_DIMENSION, 0.0);
    vector
}

pub fn course(id: i64, name: &str) -> CourseDetails {
    CourseDetails {
        id,
        name: name.to_string(),
        description: format!("About {}", name),
        ..Default::default()
    }
}

#[derive(Default)]
pub struct InMemoryMemoryStore {
    records: Mutex<HashMap<String, MemorySnapshot>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn get(&self, chat_id: &str) -> Result<Option<MemorySnapshot>, RagError> {
        Ok(self.records.lock().unwrap().get(chat_id).cloned())
    }

    async fn upsert(&self, chat_id: &str, snapshot: &MemorySnapshot) -> Result<(), RagError> {
        self.records
            .lock()
            .unwrap()
            .insert(chat_id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn delete(&self, chat_id: &str) -> Result<bool, RagError> {
        Ok(self.records.lock().unwrap().remove(chat_id).is_some())
    }
}

/// Chat model double: pops scripted replies in order, then falls back to a
/// fixed reply (or an error) once the script runs out. Records every prompt
/// it sees.
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedChatModel {
    pub fn always(reply: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// First call gets `first`, later calls get `fallback`.
    pub fn then_always(first: Result<&str, &str>, fallback: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([first
                .map(str::to_string)
                .map_err(str::to_string)])),
            fallback: Ok(fallback.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn generate(&self, prompt: &str, _temperature: f32) -> Result<String, RagError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map_err(RagError::ModelInvocation)
    }
}

/// Course catalog double backed by a fixed map, with optional per-id
/// failures to exercise the partial-fetch paths.
#[derive(Default)]
pub struct StaticCatalog {
    courses: HashMap<i64, CourseDetails>,
    failing: HashSet<i64>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_course(mut self, details: CourseDetails) -> Self {
        self.courses.insert(details.id, details);
        self
    }

    pub fn failing_on(mut self, course_id: i64) -> Self {
        self.failing.insert(course_id);
        self
    }
}

#[async_trait]
impl CourseCatalog for StaticCatalog {
    async fn fetch_course(&self, course_id: i64) -> Result<Option<CourseDetails>, RagError> {
        if self.failing.contains(&course_id) {
            return Err(RagError::ExternalFetch(format!(
                "simulated failure for course {}",
                course_id
            )));
        }
        Ok(self.courses.get(&course_id).cloned())
    }
}

/// In-memory vector index with the same contract as the Qdrant-backed one:
/// upsert-by-key, ascending L2 order, ties broken by insertion order.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: Mutex<Vec<(i64, Vec<f32>)>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl CourseVectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, course_id: i64, vector: Vec<f32>) -> Result<(), RagError> {
        if vector.len() != EMBEDDING_DIMENSION {
            return Err(RagError::VectorIndex(format!(
                "expected {}-dimensional vector, got {}",
                EMBEDDING_DIMENSION,
                vector.len()
            )));
        }

        let mut records = self.records.lock().unwrap();
        if let Some(entry) = records.iter_mut().find(|(id, _)| *id == course_id) {
            entry.1 = vector;
        } else {
            records.push((course_id, vector));
        }
        Ok(())
    }

    async fn query_nearest(&self, vector: &[f32], k: usize) -> Result<Vec<i64>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let records = self.records.lock().unwrap();
        let mut scored: Vec<(f32, i64)> = records
            .iter()
            .map(|(id, stored)| {
                let distance: f32 = stored
                    .iter()
                    .zip(vector.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (distance, *id)
            })
            .collect();

        // Stable sort keeps insertion order for equal distances.
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(k).map(|(_, id)| id).collect())
    }
}

/// Vector index double that answers every query with a fixed candidate list.
pub struct FixedVectorIndex {
    ids: Vec<i64>,
}

impl FixedVectorIndex {
    pub fn new(ids: Vec<i64>) -> Self {
        Self { ids }
    }
}

#[async_trait]
impl CourseVectorIndex for FixedVectorIndex {
    async fn upsert(&self, _course_id: i64, _vector: Vec<f32>) -> Result<(), RagError> {
        Ok(())
    }

    async fn query_nearest(&self, _vector: &[f32], k: usize) -> Result<Vec<i64>, RagError> {
        Ok(self.ids.iter().take(k).copied().collect())
    }
}

/// Vector index double that always errors, for degraded-path tests.
pub struct FailingVectorIndex;

#[async_trait]
impl CourseVectorIndex for FailingVectorIndex {
    async fn upsert(&self, _course_id: i64, _vector: Vec<f32>) -> Result<(), RagError> {
        Err(RagError::VectorIndex("index unavailable".to_string()))
    }

    async fn query_nearest(&self, _vector: &[f32], _k: usize) -> Result<Vec<i64>, RagError> {
        Err(RagError::VectorIndex("index unavailable".to_string()))
    }
}
