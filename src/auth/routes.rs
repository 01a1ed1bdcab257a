//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `POST /api/auth/register` - Create a user with credentials auth
/// - `POST /api/auth/login` - Verify credentials, issue session cookie
/// - `GET /api/auth/currentUser` - Current authenticated user id
/// - `POST /api/auth/logout` - Destroy session, clear cookie
pub fn auth_routes() -> Router {
    Router::new()
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/currentUser", get(handlers::current_user))
        .route("/api/auth/logout", post(handlers::logout))
}
