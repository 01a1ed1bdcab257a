// src/auth/service.rs
//! Auth service: registration transaction, login verification, and
//! session persistence
//!
//! Registration is the only multi-statement atomic unit in the system: the
//! user, provider, and credential rows commit together or not at all.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::common::{
    generate_credential_id, generate_provider_id, generate_session_token, generate_user_id,
    safe_email_log, safe_token_log, ApiError, Validator,
};

use super::models::{LoginRequest, LoginRow, RegisterRequest, Session};
use super::validators::RegisterValidator;

const BCRYPT_COST: u32 = 12;

/// Timestamp format matching sqlite's datetime('now')
const SQLITE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

/// Register a new user
///
/// Hashes the password, then inserts the user, its "credentials" auth
/// provider, and the credential row inside one transaction. A store
/// failure (including a UNIQUE violation on email) rolls everything back.
pub async fn register(pool: &SqlitePool, req: &RegisterRequest) -> Result<String, ApiError> {
    let validation = RegisterValidator.validate(req);
    if !validation.is_valid {
        return Err(validation.into());
    }

    let password_hash = bcrypt::hash(&req.password, BCRYPT_COST).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        ApiError::InternalServer("Password hashing failed".to_string())
    })?;

    let mut tx = pool.begin().await.map_err(ApiError::DatabaseError)?;

    let user_id = generate_user_id();
    sqlx::query("INSERT INTO users (id, username, email) VALUES (?, ?, ?)")
        .bind(&user_id)
        .bind(&req.username)
        .bind(&req.email)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::DatabaseError)?;

    let provider_id = generate_provider_id();
    sqlx::query(
        "INSERT INTO auth_providers (id, user_id, provider, provider_user_id) VALUES (?, ?, 'credentials', ?)",
    )
    .bind(&provider_id)
    .bind(&user_id)
    .bind(&user_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::DatabaseError)?;

    sqlx::query("INSERT INTO credentials (id, provider_id, password_hash) VALUES (?, ?, ?)")
        .bind(generate_credential_id())
        .bind(&provider_id)
        .bind(&password_hash)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::DatabaseError)?;

    tx.commit().await.map_err(ApiError::DatabaseError)?;

    info!(
        user_id = %user_id,
        email = %safe_email_log(&req.email),
        "User registered"
    );

    Ok(user_id)
}

/// Verify credentials and return the user id
///
/// No side effects; session creation is the HTTP layer's responsibility.
pub async fn login(pool: &SqlitePool, req: &LoginRequest) -> Result<String, ApiError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::Auth("Email and password required".to_string()));
    }

    let row: Option<LoginRow> = sqlx::query_as(
        r#"
        SELECT u.id, c.password_hash
        FROM users u
        JOIN auth_providers ap ON ap.user_id = u.id
        JOIN credentials c ON c.provider_id = ap.id
        WHERE ap.provider = 'credentials' AND u.email = ?
        "#,
    )
    .bind(&req.email)
    .fetch_optional(pool)
    .await
    .map_err(ApiError::DatabaseError)?;

    let row = match row {
        Some(row) => row,
        None => {
            warn!(email = %safe_email_log(&req.email), "Login failed: unknown email");
            return Err(invalid_credentials());
        }
    };

    // bcrypt::verify compares in constant time over the supplied password
    let valid = bcrypt::verify(&req.password, &row.password_hash).unwrap_or(false);
    if !valid {
        warn!(email = %safe_email_log(&req.email), "Login failed: password mismatch");
        return Err(invalid_credentials());
    }

    Ok(row.id)
}

/// One generic message for both unknown email and wrong password, so the
/// response cannot be used to enumerate accounts
fn invalid_credentials() -> ApiError {
    ApiError::Auth("Invalid email or password".to_string())
}

// ============================================================================
// Sessions
// ============================================================================

/// Create a session row for a freshly authenticated user
pub async fn create_session(
    pool: &SqlitePool,
    user_id: &str,
    ttl_hours: i64,
) -> Result<Session, ApiError> {
    let token = generate_session_token();
    let expires_at = (Utc::now() + Duration::hours(ttl_hours))
        .format(SQLITE_DATETIME)
        .to_string();

    sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(&token)
        .bind(user_id)
        .bind(&expires_at)
        .execute(pool)
        .await
        .map_err(ApiError::DatabaseError)?;

    info!(
        user_id = %user_id,
        session = %safe_token_log(&token),
        "Session created"
    );

    Ok(Session {
        id: token,
        user_id: user_id.to_string(),
        created_at: None,
        expires_at,
    })
}

/// Look up a session, rejecting and deleting it when expired
pub async fn find_valid_session(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<Option<Session>, ApiError> {
    let session: Option<Session> = sqlx::query_as("SELECT * FROM sessions WHERE id = ?")
        .bind(session_id)
        .fetch_optional(pool)
        .await
        .map_err(ApiError::DatabaseError)?;

    let session = match session {
        Some(session) => session,
        None => return Ok(None),
    };

    let now = Utc::now().format(SQLITE_DATETIME).to_string();
    if session.expires_at <= now {
        // Lazy cleanup on lookup; the hourly sweep handles the rest
        let _ = destroy_session(pool, session_id).await;
        return Ok(None);
    }

    Ok(Some(session))
}

pub async fn destroy_session(pool: &SqlitePool, session_id: &str) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(session_id)
        .execute(pool)
        .await
        .map_err(ApiError::DatabaseError)?;

    Ok(())
}

/// Delete every expired session row
pub async fn sweep_expired_sessions(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= datetime('now')")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Spawn the hourly background sweep of expired sessions
pub fn start_session_cleanup(pool: SqlitePool) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match sweep_expired_sessions(&pool).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Swept expired sessions"),
                Err(e) => warn!(error = %e, "Session sweep failed"),
            }
        }
    });
}
