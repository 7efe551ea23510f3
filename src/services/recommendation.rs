// src/services/recommendation.rs
use crate::backend_client::{CourseCatalog, CourseDetails, RecommendedCourse};
use crate::error::RagError;
use crate::llm::{ChatModel, TextEmbedder};
use crate::memory::HybridMemoryManager;
use crate::vector_index::CourseVectorIndex;
use futures::future::join_all;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

const CHAT_TEMPERATURE: f32 = 0.4;
const FALLBACK_RESPONSE: &str =
    "I'm sorry, I encountered an error while processing your request. Please try again.";
const PARSE_FALLBACK_EXPLANATION: &str =
    "I have analyzed your query and here are my recommendations.";

lazy_static! {
    // Models frequently wrap JSON answers in markdown code fences.
    static ref CODE_FENCE: Regex = Regex::new(r"```\w*\n?").unwrap();
}

/// The recommendation pipeline: similarity search over course embeddings,
/// candidate detail fetch, constrained model call, and a final intersection
/// of the model's picks with the candidates actually offered.
pub struct RecommendationService {
    memory: Arc<HybridMemoryManager>,
    embedder: Arc<dyn TextEmbedder>,
    index: Arc<dyn CourseVectorIndex>,
    catalog: Arc<dyn CourseCatalog>,
    model: Arc<dyn ChatModel>,
}

#[derive(Debug)]
pub struct RecommendationOutcome {
    pub response: String,
    pub recommended_courses: Vec<RecommendedCourse>,
}

impl RecommendationService {
    pub fn new(
        memory: Arc<HybridMemoryManager>,
        embedder: Arc<dyn TextEmbedder>,
        index: Arc<dyn CourseVectorIndex>,
        catalog: Arc<dyn CourseCatalog>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            memory,
            embedder,
            index,
            catalog,
            model,
        }
    }

    /// Always produces a payload. Any hard failure inside the pipeline
    /// degrades to a fixed apology with no courses and no memory mutation
    /// for that turn.
    pub async fn recommend(
        &self,
        chat_id: &str,
        query: &str,
        top_k: usize,
    ) -> RecommendationOutcome {
        match self.run(chat_id, query, top_k).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Error in course recommendation for chat {}: {}", chat_id, e);
                RecommendationOutcome {
                    response: FALLBACK_RESPONSE.to_string(),
                    recommended_courses: Vec::new(),
                }
            }
        }
    }

    async fn run(
        &self,
        chat_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<RecommendationOutcome, RagError> {
        // Memory load and similarity search are independent; run both before
        // touching the network for course details.
        let (snapshot, candidate_ids) = tokio::join!(
            self.memory.load(chat_id),
            self.similar_course_ids(query, top_k),
        );
        tracing::info!("Found similar courses for chat {}: {:?}", chat_id, candidate_ids);

        let candidates = self.fetch_candidates(&candidate_ids).await;

        let courses_context = if candidates.is_empty() {
            "No relevant courses found in the database.".to_string()
        } else {
            candidates
                .iter()
                .map(CourseDetails::context_text)
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let prompt =
            build_recommendation_prompt(&snapshot.render_context(), &courses_context, query);

        let raw = self.model.generate(&prompt, CHAT_TEMPERATURE).await?;

        let (explanation, selected_ids) = match parse_model_recommendation(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Fail open: show the raw text and the full candidate set
                // rather than nothing.
                tracing::warn!("Could not parse model response ({}); using raw text", e);
                (raw.clone(), candidates.iter().map(|c| c.id).collect())
            }
        };

        // Anti-hallucination filter: only ids we actually offered as
        // candidates make it into the response.
        let recommended_courses: Vec<RecommendedCourse> = candidates
            .iter()
            .filter(|course| selected_ids.contains(&course.id))
            .map(CourseDetails::to_recommended)
            .collect();

        let updated = self.memory.record_turn(&snapshot, query, &explanation).await;
        self.memory.persist(chat_id, &updated).await;

        Ok(RecommendationOutcome {
            response: explanation,
            recommended_courses,
        })
    }

    /// Embed the query and look up the nearest course ids. Both steps
    /// degrade to "no candidates" instead of failing the request.
    async fn similar_course_ids(&self, query: &str, top_k: usize) -> Vec<i64> {
        let vector = match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!("Failed to embed query: {}", e);
                return Vec::new();
            }
        };

        match self.index.query_nearest(&vector, top_k).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Similarity search failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Fetch details for every candidate concurrently. One failed fetch
    /// never blocks or fails the others; failed or empty lookups are
    /// dropped and the survivors keep their similarity order.
    async fn fetch_candidates(&self, candidate_ids: &[i64]) -> Vec<CourseDetails> {
        let fetches = candidate_ids.iter().map(|id| self.catalog.fetch_course(*id));
        let results = join_all(fetches).await;

        let mut candidates = Vec::with_capacity(candidate_ids.len());
        for (course_id, result) in candidate_ids.iter().zip(results) {
            match result {
                Ok(Some(details)) => candidates.push(details),
                Ok(None) => {
                    tracing::debug!("Course {} had no catalog data; dropped", course_id)
                }
                Err(e) => {
                    tracing::warn!("Dropping course {} after fetch failure: {}", course_id, e)
                }
            }
        }
        candidates
    }
}

fn build_recommendation_prompt(
    conversation_context: &str,
    courses_context: &str,
    query: &str,
) -> String {
    format!(
        "You are a course recommendation assistant. Only recommend courses from the provided database.\n\n\
         {}Available Courses:\n{}\n\n\
         User Query: {}\n\n\
         Please recommend the most suitable courses. Output in JSON format:\n\n\
         {{\n\
         \"explanation\": \"A brief explanation of the recommendations\",\n\
         \"recommended_course_ids\": [list of course IDs (numbers) from the available courses that you recommend]\n\
         }}\n\n\
         Only include course IDs that are explicitly listed in the available courses above.\n\
         If no suitable courses are found, set recommended_course_ids to [] and provide an appropriate explanation.",
        conversation_context, courses_context, query
    )
}

#[derive(Debug, Deserialize)]
struct ModelRecommendation {
    explanation: Option<String>,
    #[serde(default)]
    recommended_course_ids: Vec<serde_json::Value>,
}

/// Parse the model's structured answer after stripping code-fence markup.
/// Ids may come back as numbers or digit strings; anything else is ignored.
fn parse_model_recommendation(raw: &str) -> Result<(String, Vec<i64>), RagError> {
    let cleaned = CODE_FENCE.replace_all(raw, "");
    let parsed: ModelRecommendation = serde_json::from_str(cleaned.trim())
        .map_err(|e| RagError::ResponseParse(e.to_string()))?;

    let ids = parsed
        .recommended_course_ids
        .iter()
        .filter_map(coerce_course_id)
        .collect();

    let explanation = parsed
        .explanation
        .unwrap_or_else(|| PARSE_FALLBACK_EXPLANATION.to_string());

    Ok((explanation, ids))
}

fn coerce_course_id(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
