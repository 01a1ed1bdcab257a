// src/main.rs
use axum::{extract::Extension, middleware, routing::get, Json, Router};
use chrono::Utc;
use dotenv::dotenv;
use reqwest::Client;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// MODULE IMPORTS
// ============================================================================

mod auth;
mod capture;
mod common;
mod logging_middleware;
mod services;

// ============================================================================
// COMMON IMPORTS
// ============================================================================

use common::{ApiError, AppState};
use services::documentai::{DocumentAiConfig, DocumentAiService};
use services::openai::{OpenAiConfig, OpenAiService};

/// Per-call upper bound on outbound provider requests. The providers set no
/// timeout of their own, so one is imposed here.
const PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Session lifetime, matching the cookie's Max-Age
const SESSION_TTL_HOURS: i64 = 24;

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // ========================================================================
    // ENVIRONMENT CONFIGURATION
    // ========================================================================

    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://wordcapture.db".to_string());

    // ========================================================================
    // DATABASE SETUP
    // ========================================================================

    if let Some(path_part) = database_url.strip_prefix("sqlite://") {
        let path_without_params = path_part.split('?').next().unwrap_or("");
        if !path_without_params.is_empty() && !path_without_params.starts_with(':') {
            let db_path = PathBuf::from(path_without_params);
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }
    }

    let connect_options = SqliteConnectOptions::from_str(&database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(connect_options)
        .await?;

    // Run database migrations
    common::migrations::run_migrations(&pool).await?;

    // ========================================================================
    // SERVICE INITIALIZATION
    // ========================================================================

    // Shared client for the two provider gateways, with the outbound
    // per-call timeout baked in
    let provider_client = Client::builder()
        .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
        .build()?;

    // Provider misconfiguration fails the process at startup rather than
    // surfacing on the first request
    let documentai_config = DocumentAiConfig::from_env();
    let validation = documentai_config.validate();
    if !validation.is_valid {
        anyhow::bail!(
            "Document AI configuration invalid: {}",
            validation.into_message()
        );
    }
    let documentai_service = Arc::new(DocumentAiService::new(
        documentai_config,
        provider_client.clone(),
    ));
    info!("DocumentAiService initialized");

    let openai_config = OpenAiConfig::from_env();
    let validation = openai_config.validate();
    if !validation.is_valid {
        anyhow::bail!("OpenAI configuration invalid: {}", validation.into_message());
    }
    let openai_service = Arc::new(OpenAiService::new(openai_config, provider_client));
    info!("OpenAiService initialized");

    auth::service::start_session_cleanup(pool.clone());
    info!("Session cleanup task started");

    // ========================================================================
    // APPLICATION STATE
    // ========================================================================

    let app_state = AppState {
        db: pool,
        session_ttl_hours: SESSION_TTL_HOURS,
        documentai_service,
        openai_service,
    };

    let shared = Arc::new(RwLock::new(app_state));

    // ========================================================================
    // ROUTER COMPOSITION
    // ========================================================================

    let app = Router::new()
        // ====================================================================
        // BASE ROUTES
        // ====================================================================
        .route("/", get(root))
        .route("/health", get(health))
        // ====================================================================
        // AUTHENTICATION ROUTES
        // ====================================================================
        .merge(auth::auth_routes())
        // ====================================================================
        // CAPTURE ROUTES (pipeline and gateway status)
        // ====================================================================
        .merge(capture::capture_routes())
        // ====================================================================
        // 404 HANDLER
        // ====================================================================
        .fallback(not_found)
        // ====================================================================
        // MIDDLEWARE AND LAYERS
        // ====================================================================
        // Add request/response body logging in debug mode
        .layer(middleware::from_fn(logging_middleware::log_request_response))
        .layer(Extension(shared.clone()))
        .layer({
            // Get CORS origins from environment variable
            let cors_origins = std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5173".to_string());

            let origins: Vec<axum::http::HeaderValue> = cors_origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([axum::http::header::CONTENT_TYPE])
                .allow_credentials(true)
        })
        .layer(TraceLayer::new_for_http());

    // ========================================================================
    // SERVER STARTUP
    // ========================================================================

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

// ============================================================================
// BASE HANDLERS
// ============================================================================

/// GET / - welcome banner
async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to WordCapture API",
        "version": "1.0.0",
        "status": "running"
    }))
}

/// GET /health - liveness check
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

/// Fallback for unknown routes
async fn not_found(uri: axum::http::Uri) -> ApiError {
    ApiError::NotFound(format!("Route not found: {}", uri.path()))
}
