use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

mod backend_client;
mod config;
mod db;
mod error;
mod gemini_client;
mod handlers;
mod llm;
mod memory;
mod services;
mod vector_index;

#[cfg(test)]
mod test_support;

use config::{EmbeddingProvider, Settings};
use llm::{ChatModel, HashEmbedder, TextEmbedder};

// Shared state for the HTTP handlers: database pool plus the three
// pipeline services, all behind Arc.
pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub memory: Arc<memory::HybridMemoryManager>,
    pub recommendation: services::RecommendationService,
    pub question: services::CourseQuestionService,
    pub indexing: services::IndexingService,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging().expect("Failed to initialize logging");

    let settings = Settings::from_env().expect("Invalid configuration");

    // Create the database connection pool (runs migrations on startup)
    let db_pool = db::create_pool(&settings.database_url)
        .await
        .expect("Failed to create database pool.");

    // Vector index: a missing collection is created here; an unreachable
    // Qdrant only degrades recommendations, so the server still starts.
    let index = vector_index::QdrantCourseIndex::new(
        &settings.qdrant_url,
        settings.qdrant_api_key.clone(),
    )
    .expect("Invalid Qdrant configuration");
    match index.ensure_collection().await {
        Ok(_) => tracing::info!("Qdrant vector index ready"),
        Err(e) => tracing::error!("Qdrant unavailable at startup: {}", e),
    }
    let index: Arc<dyn vector_index::CourseVectorIndex> = Arc::new(index);

    let gemini = Arc::new(gemini_client::GeminiClient::new(
        settings.gemini_api_key.clone(),
    ));
    let model: Arc<dyn ChatModel> = gemini.clone();

    let embedder: Arc<dyn TextEmbedder> = match settings.embedding_provider {
        EmbeddingProvider::Gemini => {
            tracing::info!("Using Gemini embeddings (text-embedding-004)");
            gemini.clone()
        }
        EmbeddingProvider::Hash => {
            tracing::info!("Using deterministic hash embeddings");
            Arc::new(HashEmbedder)
        }
    };

    let catalog: Arc<dyn backend_client::CourseCatalog> = Arc::new(
        backend_client::CourseCatalogClient::new(settings.backend_url.clone()),
    );

    let store = Arc::new(memory::PgMemoryStore::new(db_pool.clone()));
    let memory = Arc::new(memory::HybridMemoryManager::new(store, model.clone()));

    let recommendation = services::RecommendationService::new(
        memory.clone(),
        embedder.clone(),
        index.clone(),
        catalog.clone(),
        model.clone(),
    );
    let question = services::CourseQuestionService::new(memory.clone(), catalog, model);
    let indexing = services::IndexingService::new(embedder, index);

    let shared_state = Arc::new(AppState {
        db_pool,
        memory,
        recommendation,
        question,
        indexing,
    });

    // Build our application with all routes and shared state
    let app = Router::new()
        .merge(handlers::chat::chat_routes())
        .merge(handlers::admin::admin_routes())
        .route("/health", axum::routing::get(health))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state));

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .expect("Failed to bind server address");
    tracing::info!("listening on {}", settings.bind_addr);
    axum::serve(listener, app)
        .await
        .expect("Server error");
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,course_rag=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,course_rag=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON logging for production (easier for log aggregation)
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed()
    } else {
        // Human-readable logging for development
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Course RAG service starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Build mode: {}",
        if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        }
    );

    Ok(())
}

// Health check endpoint
async fn health(
    Extension(state): Extension<Arc<AppState>>,
) -> axum::response::Json<serde_json::Value> {
    use serde_json::json;

    let db_status = match sqlx::query("SELECT 1").fetch_one(&state.db_pool).await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    axum::response::Json(json!({
        "status": "operational",
        "service": "course-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_status,
    }))
}
