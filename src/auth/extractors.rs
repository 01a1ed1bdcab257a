//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::request::Parts,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::cookies::{get_cookie_value, SESSION_COOKIE};
use super::models::User;
use super::service;
use crate::common::{safe_email_log, safe_token_log, ApiError, AppState};

/// Authenticated session extractor
///
/// Validates the session cookie against the sessions table and loads the
/// user it belongs to. Handlers that need an authenticated user take this
/// as an argument; requests with a missing or expired session are rejected
/// with 401 before the handler body runs.
#[derive(Debug)]
pub struct SessionUser {
    pub user_id: String,
    pub email: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Extract the Extension containing the AppState
        let Extension(state_lock): Extension<Arc<RwLock<AppState>>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let app_state = state_lock.read().await.clone();

        let token = match get_cookie_value(&parts.headers, SESSION_COOKIE) {
            Some(t) => t,
            None => {
                warn!("Authentication failed: missing session cookie");
                return Err(ApiError::Auth("Not authenticated".into()));
            }
        };

        let session = match service::find_valid_session(&app_state.db, &token).await? {
            Some(session) => session,
            None => {
                warn!(
                    session = %safe_token_log(&token),
                    "Authentication failed: session missing or expired"
                );
                return Err(ApiError::Auth("Not authenticated".into()));
            }
        };

        // Look up the session's user
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&session.user_id)
            .fetch_optional(&app_state.db)
            .await
            .map_err(ApiError::DatabaseError)?;

        match user {
            Some(user) => {
                debug!(
                    user_id = %user.id,
                    email = %safe_email_log(&user.email),
                    session = %safe_token_log(&token),
                    "Session authentication successful"
                );
                Ok(SessionUser {
                    user_id: user.id,
                    email: user.email,
                })
            }
            None => {
                warn!(user_id = %session.user_id, "Authentication failed: user not found in database");
                Err(ApiError::Auth("Not authenticated".into()))
            }
        }
    }
}
