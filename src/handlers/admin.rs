// src/handlers/admin.rs
//! Index management endpoints used by the course backend

use crate::services::indexing::IndexCourseRequest;
use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::post,
    Router,
};
use serde_json::json;
use std::sync::Arc;

pub fn admin_routes() -> Router {
    Router::new().route("/api/rag/index-course", post(index_course))
}

/// POST /api/rag/index-course - Embed and (re)index a course document.
async fn index_course(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<IndexCourseRequest>,
) -> impl IntoResponse {
    match state.indexing.index_course(&request).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "message": format!("Course {} indexed successfully", request.course_id),
                "success": true,
            })),
        ),
        Err(e) => {
            tracing::error!("Failed to index course {}: {}", request.course_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "message": format!("Failed to index course {}", request.course_id),
                    "success": false,
                })),
            )
        }
    }
}
