// src/services/mod.rs
pub mod course_question;
pub mod indexing;
pub mod recommendation;

pub use course_question::CourseQuestionService;
pub use indexing::IndexingService;
pub use recommendation::RecommendationService;
