// src/handlers/chat.rs
//! Chat endpoints - recommendations, course questions, memory reset

use crate::AppState;
use axum::{
    extract::Extension,
    response::{IntoResponse, Json},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_TOP_K: usize = 5;
const MAX_TOP_K: usize = 10;

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Deserialize)]
pub struct RecommendRequest {
    pub chat_id: String,
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Deserialize)]
pub struct CourseQuestionRequest {
    pub chat_id: String,
    pub course_id: i64,
    pub query: String,
}

#[derive(Deserialize)]
pub struct ClearChatRequest {
    pub chat_id: String,
}

#[derive(Serialize)]
pub struct RecommendResponse {
    pub chat_id: String,
    pub response: String,
    pub recommended_courses: Vec<crate::backend_client::RecommendedCourse>,
    pub message_type: &'static str,
}

#[derive(Serialize)]
pub struct CourseQuestionResponse {
    pub chat_id: String,
    pub course_id: i64,
    pub response: String,
    pub message_type: &'static str,
}

#[derive(Serialize)]
pub struct ClearChatResponse {
    pub message: String,
    pub success: bool,
}

pub fn chat_routes() -> Router {
    Router::new()
        .route("/api/rag/recommend", post(recommend))
        .route("/api/rag/ask-about-course", post(ask_about_course))
        .route("/api/rag/clear-chat", post(clear_chat))
}

/// POST /api/rag/recommend - Course recommendations for a free-text query.
/// Always returns 200; failures surface as an apology payload.
async fn recommend(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<RecommendRequest>,
) -> impl IntoResponse {
    let top_k = request.top_k.clamp(1, MAX_TOP_K);
    tracing::info!(
        "Recommendation request for chat {} (top_k={})",
        request.chat_id,
        top_k
    );

    let outcome = state
        .recommendation
        .recommend(&request.chat_id, &request.query, top_k)
        .await;

    Json(RecommendResponse {
        chat_id: request.chat_id,
        response: outcome.response,
        recommended_courses: outcome.recommended_courses,
        message_type: "recommendation",
    })
}

/// POST /api/rag/ask-about-course - Answer a question about one course.
async fn ask_about_course(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<CourseQuestionRequest>,
) -> impl IntoResponse {
    tracing::info!(
        "Course question for chat {} about course {}",
        request.chat_id,
        request.course_id
    );

    let response = state
        .question
        .answer(&request.chat_id, request.course_id, &request.query)
        .await;

    Json(CourseQuestionResponse {
        chat_id: request.chat_id,
        course_id: request.course_id,
        response,
        message_type: "course_question",
    })
}

/// POST /api/rag/clear-chat - Drop the stored conversation memory.
async fn clear_chat(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<ClearChatRequest>,
) -> impl IntoResponse {
    let cleared = state.memory.clear(&request.chat_id).await;
    Json(clear_chat_response(&request.chat_id, cleared))
}

fn clear_chat_response(chat_id: &str, cleared: bool) -> ClearChatResponse {
    let message = if cleared {
        format!("Chat history cleared for {}", chat_id)
    } else {
        format!("No chat history found for {}", chat_id)
    };

    ClearChatResponse {
        message,
        success: cleared,
    }
}
