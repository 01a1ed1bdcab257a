//! Authentication handlers

use axum::extract::{Extension, Json};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

use super::cookies::{clear_session_cookie, get_cookie_value, session_cookie, SESSION_COOKIE};
use super::extractors::SessionUser;
use super::models::{LoginRequest, RegisterRequest};
use super::service;
use crate::common::{ApiError, AppState};

/// POST /api/auth/register
/// Creates a user with credentials-based authentication
///
/// # Request Body
/// ```json
/// {
///   "username": "ana",
///   "email": "ana@example.com",
///   "password": "..."
/// }
/// ```
///
/// # Response
/// ```json
/// { "id": "U_K7NP3X" }
/// ```
pub async fn register(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let state = state_lock.read().await.clone();

    let user_id = service::register(&state.db, &payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": user_id })),
    ))
}

/// POST /api/auth/login
/// Verifies credentials and issues the session cookie. Session creation is
/// deliberately here rather than in the service: the service only answers
/// "are these credentials valid".
///
/// # Response
/// ```json
/// { "id": "U_K7NP3X" }
/// ```
pub async fn login(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let state = state_lock.read().await.clone();

    let user_id = service::login(&state.db, &payload).await?;
    let session = service::create_session(&state.db, &user_id, state.session_ttl_hours).await?;

    info!(user_id = %user_id, "User logged in");

    Ok((
        StatusCode::OK,
        AppendHeaders([(
            header::SET_COOKIE,
            session_cookie(&session.id, state.session_ttl_hours),
        )]),
        Json(serde_json::json!({ "id": user_id })),
    ))
}

/// GET /api/auth/currentUser
/// Returns the authenticated user's id, 401 otherwise
pub async fn current_user(session: SessionUser) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(serde_json::json!({ "id": session.user_id })))
}

/// POST /api/auth/logout
/// Destroys the session row and clears the cookie. A request without a
/// session cookie still gets a 200 and a cleared cookie.
pub async fn logout(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let state = state_lock.read().await.clone();

    if let Some(token) = get_cookie_value(&headers, SESSION_COOKIE) {
        if let Err(e) = service::destroy_session(&state.db, &token).await {
            error!(error = %e, "Logout failed");
            return Err(ApiError::InternalServer("Logout failed".to_string()));
        }
    }

    info!("User logout successful");

    Ok((
        StatusCode::OK,
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie())]),
        Json(serde_json::json!({ "message": "Logged out" })),
    ))
}
