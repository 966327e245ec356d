//! Router configuration for the API server.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Upload registration and content delivery
        .route("/api/documents", post(handlers::request_upload))
        .route("/api/documents/:doc_id/content", put(handlers::upload_content))
        // Document listing and retrieval
        .route("/api/documents", get(handlers::list_documents))
        .route("/api/documents/:doc_id", get(handlers::get_document))
        // Per-document actions
        .route("/api/documents/:doc_id/process", post(handlers::process_document))
        .route("/api/documents/:doc_id/cancel", post(handlers::cancel_document))
        // Human-review collaborator callbacks
        .route("/api/reviews", get(handlers::list_pending_reviews))
        .route("/api/reviews/:task_id/complete", post(handlers::complete_review))
        // Status
        .route("/api/status", get(handlers::api_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
