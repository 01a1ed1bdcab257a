//! Tests for the auth module
//!
//! These tests verify core authentication functionality including:
//! - registration atomicity (one user + provider + credential, or nothing)
//! - login semantics (generic failure message, no user enumeration)
//! - session lifecycle (create, expire, destroy)

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::common::{migrations, ApiError};

use super::models::{LoginRequest, RegisterRequest};
use super::service;

async fn test_pool() -> SqlitePool {
    // One connection so every query sees the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    migrations::run_migrations(&pool).await.expect("migrations");
    pool
}

fn register_request(username: &str, email: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        email: email.to_string(),
        password: password.to_string(),
    }
}

fn login_request(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("count query")
}

#[tokio::test]
async fn test_register_creates_exactly_one_row_per_table() {
    let pool = test_pool().await;

    let user_id = service::register(&pool, &register_request("ana", "ana@example.com", "hunter2"))
        .await
        .expect("registration");

    assert!(user_id.starts_with("U_"));
    assert_eq!(count(&pool, "users").await, 1);
    assert_eq!(count(&pool, "auth_providers").await, 1);
    assert_eq!(count(&pool, "credentials").await, 1);

    // The provider row links back to the user and uses the credentials method
    let (provider, provider_user_id): (String, String) =
        sqlx::query_as("SELECT provider, provider_user_id FROM auth_providers WHERE user_id = ?")
            .bind(&user_id)
            .fetch_one(&pool)
            .await
            .expect("provider row");
    assert_eq!(provider, "credentials");
    assert_eq!(provider_user_id, user_id);
}

#[tokio::test]
async fn test_register_never_stores_plaintext_password() {
    let pool = test_pool().await;

    service::register(&pool, &register_request("ana", "ana@example.com", "hunter2"))
        .await
        .expect("registration");

    let hash: String = sqlx::query_scalar("SELECT password_hash FROM credentials")
        .fetch_one(&pool)
        .await
        .expect("credential row");
    assert_ne!(hash, "hunter2");
    assert!(hash.starts_with("$2"), "expected a bcrypt hash, got {}", hash);
}

#[tokio::test]
async fn test_register_duplicate_email_fails_and_keeps_one_user() {
    let pool = test_pool().await;

    service::register(&pool, &register_request("ana", "ana@example.com", "hunter2"))
        .await
        .expect("first registration");

    let err = service::register(&pool, &register_request("bea", "ana@example.com", "other"))
        .await
        .expect_err("duplicate email must fail");
    assert!(matches!(err, ApiError::DatabaseError(_)));

    // The failed transaction left nothing behind
    assert_eq!(count(&pool, "users").await, 1);
    assert_eq!(count(&pool, "auth_providers").await, 1);
    assert_eq!(count(&pool, "credentials").await, 1);
}

#[tokio::test]
async fn test_register_empty_password_inserts_nothing() {
    let pool = test_pool().await;

    let err = service::register(&pool, &register_request("ana", "ana@example.com", ""))
        .await
        .expect_err("empty password must fail validation");
    assert!(matches!(err, ApiError::Validation(_)));

    assert_eq!(count(&pool, "users").await, 0);
    assert_eq!(count(&pool, "auth_providers").await, 0);
    assert_eq!(count(&pool, "credentials").await, 0);
}

#[tokio::test]
async fn test_login_returns_registered_user_id() {
    let pool = test_pool().await;

    let registered = service::register(&pool, &register_request("ana", "ana@example.com", "hunter2"))
        .await
        .expect("registration");

    let logged_in = service::login(&pool, &login_request("ana@example.com", "hunter2"))
        .await
        .expect("login");

    assert_eq!(logged_in, registered);
}

#[tokio::test]
async fn test_login_failure_message_does_not_reveal_which_part_was_wrong() {
    let pool = test_pool().await;

    service::register(&pool, &register_request("ana", "ana@example.com", "hunter2"))
        .await
        .expect("registration");

    let wrong_password = service::login(&pool, &login_request("ana@example.com", "nope"))
        .await
        .expect_err("wrong password must fail");
    let unknown_email = service::login(&pool, &login_request("ghost@example.com", "hunter2"))
        .await
        .expect_err("unknown email must fail");

    let message = |err: &ApiError| match err {
        ApiError::Auth(msg) => msg.clone(),
        other => panic!("expected Auth error, got {:?}", other),
    };

    assert_eq!(message(&wrong_password), message(&unknown_email));
    assert_eq!(message(&wrong_password), "Invalid email or password");
}

#[tokio::test]
async fn test_login_empty_fields_rejected_with_auth_error() {
    let pool = test_pool().await;

    let err = service::login(&pool, &login_request("", ""))
        .await
        .expect_err("empty credentials must fail");
    assert!(matches!(err, ApiError::Auth(_)));
}

#[tokio::test]
async fn test_session_lifecycle() {
    let pool = test_pool().await;

    let user_id = service::register(&pool, &register_request("ana", "ana@example.com", "hunter2"))
        .await
        .expect("registration");

    let session = service::create_session(&pool, &user_id, 24)
        .await
        .expect("session creation");
    assert_eq!(session.id.len(), 26);

    let found = service::find_valid_session(&pool, &session.id)
        .await
        .expect("lookup")
        .expect("session should be valid");
    assert_eq!(found.user_id, user_id);

    service::destroy_session(&pool, &session.id)
        .await
        .expect("destroy");
    assert!(service::find_valid_session(&pool, &session.id)
        .await
        .expect("lookup")
        .is_none());
}

#[tokio::test]
async fn test_expired_session_is_rejected_and_removed() {
    let pool = test_pool().await;

    let user_id = service::register(&pool, &register_request("ana", "ana@example.com", "hunter2"))
        .await
        .expect("registration");

    sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES (?, ?, '2000-01-01 00:00:00')")
        .bind("EXPIREDTOKEN")
        .bind(&user_id)
        .execute(&pool)
        .await
        .expect("insert expired session");

    assert!(service::find_valid_session(&pool, "EXPIREDTOKEN")
        .await
        .expect("lookup")
        .is_none());

    // The lookup lazily deleted the stale row
    assert_eq!(count(&pool, "sessions").await, 0);
}

#[tokio::test]
async fn test_sweep_removes_only_expired_sessions() {
    let pool = test_pool().await;

    let user_id = service::register(&pool, &register_request("ana", "ana@example.com", "hunter2"))
        .await
        .expect("registration");

    service::create_session(&pool, &user_id, 24)
        .await
        .expect("live session");
    sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES (?, ?, '2000-01-01 00:00:00')")
        .bind("EXPIREDTOKEN")
        .bind(&user_id)
        .execute(&pool)
        .await
        .expect("insert expired session");

    let removed = service::sweep_expired_sessions(&pool)
        .await
        .expect("sweep");
    assert_eq!(removed, 1);
    assert_eq!(count(&pool, "sessions").await, 1);
}
