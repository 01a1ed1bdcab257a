// src/common/migrations.rs
//! Database migration and schema management

use sqlx::SqlitePool;
use std::env;
use tracing::{info, warn};

/// Run all database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Only drop tables if RESET_DB environment variable is set to "true"
    // This prevents data loss on server restarts
    let should_reset_db = env::var("RESET_DB").unwrap_or_else(|_| "false".to_string()) == "true";

    if should_reset_db {
        warn!("⚠️  RESET_DB=true - Dropping all tables and recreating schema...");
        drop_all_tables(pool).await?;
        info!("✅ Dropped old tables");
    } else {
        info!("ℹ️  Skipping table drop (RESET_DB not set). Tables will be created if they don't exist.");
    }

    create_auth_tables(pool).await?;
    create_session_tables(pool).await?;
    create_indexes(pool).await?;

    info!("✅ Database migration completed successfully!");

    Ok(())
}

async fn drop_all_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Drop tables in reverse dependency order
    let tables = vec!["sessions", "credentials", "auth_providers", "users"];

    for table in tables {
        let _ = sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(pool)
            .await;
    }

    Ok(())
}

async fn create_auth_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Users table. Rows are immutable after registration; there is no
    // update or delete path.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            created_at TEXT DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Auth providers table - one row per login method for a user.
    // Only provider = 'credentials' is implemented.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS auth_providers (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            provider_user_id TEXT NOT NULL,
            access_token TEXT,
            refresh_token TEXT,
            created_at TEXT DEFAULT (datetime('now')),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Credentials table - password hash for a 'credentials' provider row.
    // Stores a bcrypt hash, never the plaintext password.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS credentials (
            id TEXT PRIMARY KEY,
            provider_id TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            FOREIGN KEY(provider_id) REFERENCES auth_providers(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_session_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Sessions table - opaque server-side records keyed by the cookie token.
    // Created on login, read per authenticated request, destroyed on logout
    // or expiry.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            expires_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let indexes = vec![
        "CREATE INDEX IF NOT EXISTS idx_auth_providers_user_id ON auth_providers(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_auth_providers_provider ON auth_providers(provider)",
        "CREATE INDEX IF NOT EXISTS idx_credentials_provider_id ON credentials(provider_id)",
        "CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at)",
    ];

    for index in indexes {
        sqlx::query(index).execute(pool).await?;
    }

    Ok(())
}
