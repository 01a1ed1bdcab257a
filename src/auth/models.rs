//! Authentication data models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User database model. Rows are immutable after registration.
#[derive(FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: Option<String>,
}

/// Server-side session record keyed by the cookie token
#[derive(FromRow, Serialize, Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: Option<String>,
    pub expires_at: String,
}

/// POST /api/auth/register payload
#[derive(Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// POST /api/auth/login payload
#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Join row used by login: user identity plus the stored hash
#[derive(FromRow, Debug)]
pub struct LoginRow {
    pub id: String,
    pub password_hash: String,
}
