// Application state shared across all modules

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::services::{DocumentAiService, OpenAiService};

/// Application state containing database pool, gateway services, and
/// configuration
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub session_ttl_hours: i64,
    pub documentai_service: Arc<DocumentAiService>,
    pub openai_service: Arc<OpenAiService>,
}
