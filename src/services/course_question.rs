// src/services/course_question.rs
use crate::backend_client::CourseCatalog;
use crate::error::RagError;
use crate::llm::ChatModel;
use crate::memory::HybridMemoryManager;
use std::sync::Arc;

const CHAT_TEMPERATURE: f32 = 0.4;
const FALLBACK_RESPONSE: &str =
    "I'm sorry, I encountered an error while processing your question about this course.";
const NOT_FOUND_RESPONSE: &str = "I'm sorry, I couldn't find information about that course.";

/// Answers a question about one known course, with conversational memory.
/// Same shape as the recommendation pipeline minus the similarity search,
/// and the model's text is returned verbatim (no structured parsing).
pub struct CourseQuestionService {
    memory: Arc<HybridMemoryManager>,
    catalog: Arc<dyn CourseCatalog>,
    model: Arc<dyn ChatModel>,
}

impl CourseQuestionService {
    pub fn new(
        memory: Arc<HybridMemoryManager>,
        catalog: Arc<dyn CourseCatalog>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            memory,
            catalog,
            model,
        }
    }

    /// Always produces a payload: the model answer, a "not found" notice
    /// when the course cannot be fetched, or a fixed apology on any other
    /// failure. Memory is only mutated on the happy path.
    pub async fn answer(&self, chat_id: &str, course_id: i64, query: &str) -> String {
        match self.run(chat_id, course_id, query).await {
            Ok(response) => response,
            Err(RagError::CourseNotFound(id)) => {
                tracing::info!("Course {} not found for chat {}", id, chat_id);
                NOT_FOUND_RESPONSE.to_string()
            }
            Err(e) => {
                tracing::error!(
                    "Error answering course question for chat {}: {}",
                    chat_id,
                    e
                );
                FALLBACK_RESPONSE.to_string()
            }
        }
    }

    async fn run(&self, chat_id: &str, course_id: i64, query: &str) -> Result<String, RagError> {
        let snapshot = self.memory.load(chat_id).await;

        let course = match self.catalog.fetch_course(course_id).await {
            Ok(Some(course)) => course,
            Ok(None) => return Err(RagError::CourseNotFound(course_id)),
            Err(e) => {
                // A failed fetch short-circuits the same way as a missing
                // course: no model call, no memory write.
                tracing::warn!("Course {} fetch failed: {}", course_id, e);
                return Err(RagError::CourseNotFound(course_id));
            }
        };

        let prompt = format!(
            "{}Course Information:\n{}\n\n\
             User Question: {}\n\n\
             Please answer the user's question based on the course information provided. Be specific and helpful.\n\
             Only use information from the course data above.",
            snapshot.render_context(),
            course.context_text(),
            query
        );

        let response = self.model.generate(&prompt, CHAT_TEMPERATURE).await?;

        let course_name = if course.name.is_empty() {
            "course"
        } else {
            course.name.as_str()
        };
        let user_text = format!("Question about {}: {}", course_name, query);

        let updated = self.memory.record_turn(&snapshot, &user_text, &response).await;
        self.memory.persist(chat_id, &updated).await;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::test_support::{course, InMemoryMemoryStore, ScriptedChatModel, StaticCatalog};

    struct Fixture {
        service: CourseQuestionService,
        store: Arc<InMemoryMemoryStore>,
        model: Arc<ScriptedChatModel>,
    }

    fn fixture(catalog: StaticCatalog, model: ScriptedChatModel) -> Fixture {
        let store = Arc::new(InMemoryMemoryStore::new());
        let summarizer = Arc::new(ScriptedChatModel::always("summary"));
        let memory = Arc::new(HybridMemoryManager::new(store.clone(), summarizer));
        let model = Arc::new(model);

        let service = CourseQuestionService::new(memory, Arc::new(catalog), model.clone());
        Fixture {
            service,
            store,
            model,
        }
    }

    #[tokio::test]
    async fn answers_with_verbatim_model_text_and_records_memory() {
        let catalog = StaticCatalog::new().with_course(course(7, "Databases 101"));
        let fx = fixture(catalog, ScriptedChatModel::always("It covers indexing."));

        let response = fx.service.answer("chat", 7, "does it cover indexing?").await;
        assert_eq!(response, "It covers indexing.");

        let snapshot = fx.store.get("chat").await.unwrap().unwrap();
        assert_eq!(snapshot.recent_turns.len(), 2);
        assert_eq!(
            snapshot.recent_turns[0].content,
            "Question about Databases 101: does it cover indexing?"
        );
        assert_eq!(snapshot.recent_turns[1].content, "It covers indexing.");
    }

    #[tokio::test]
    async fn unknown_course_short_circuits_without_model_call() {
        let fx = fixture(StaticCatalog::new(), ScriptedChatModel::always("unused"));

        let response = fx.service.answer("chat", 404, "anything?").await;
        assert_eq!(response, NOT_FOUND_RESPONSE);
        assert_eq!(fx.model.call_count(), 0);
        assert!(fx.store.get("chat").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_fetch_is_treated_as_not_found() {
        let catalog = StaticCatalog::new().failing_on(9);
        let fx = fixture(catalog, ScriptedChatModel::always("unused"));

        let response = fx.service.answer("chat", 9, "anything?").await;
        assert_eq!(response, NOT_FOUND_RESPONSE);
        assert_eq!(fx.model.call_count(), 0);
    }

    #[tokio::test]
    async fn model_failure_yields_apology_without_memory_write() {
        let catalog = StaticCatalog::new().with_course(course(7, "Databases 101"));
        let fx = fixture(catalog, ScriptedChatModel::failing("timed out"));

        let response = fx.service.answer("chat", 7, "anything?").await;
        assert_eq!(response, FALLBACK_RESPONSE);
        assert!(fx.store.get("chat").await.unwrap().is_none());
    }
}
