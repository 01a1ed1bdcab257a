//! Capture routes

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use super::handlers;

/// Room for the 5 MiB image plus multipart framing overhead
const CAPTURE_BODY_LIMIT: usize = 6 * 1024 * 1024;

/// Creates and returns the capture router
///
/// # Routes
/// - `POST /api/capture` - Run an image through the extraction/analysis pipeline
/// - `POST /api/openai/chat` - Analyze already-extracted text
/// - `GET /api/documentai/status` - Extraction gateway status
/// - `GET /api/openai/status` - Analysis gateway status
pub fn capture_routes() -> Router {
    Router::new()
        .route("/api/capture", post(handlers::capture))
        .layer(DefaultBodyLimit::max(CAPTURE_BODY_LIMIT))
        .route("/api/openai/chat", post(handlers::analyze_text))
        .route("/api/documentai/status", get(handlers::documentai_status))
        .route("/api/openai/status", get(handlers::openai_status))
}
