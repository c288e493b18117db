use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::utils::error::Result;

pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    info!(url = %config.url, "database connected");
    Ok(pool)
}

/// In-memory pool for tests. Capped at one connection: every connection to
/// `sqlite::memory:` would otherwise get its own empty database.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS platform_tokens (
            id TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            access_token TEXT NOT NULL,
            refresh_token TEXT,
            token_type TEXT NOT NULL DEFAULT 'Bearer',
            scope TEXT,
            expires_at TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS platform_accounts (
            id TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            username TEXT NOT NULL,
            encrypted_password TEXT NOT NULL,
            two_factor_secret TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_login TEXT,
            login_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (platform, username)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS registration_attempts (
            id TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            product_ref TEXT NOT NULL,
            product_name TEXT NOT NULL,
            product_description TEXT,
            status TEXT NOT NULL DEFAULT 'PENDING',
            error_message TEXT,
            error_code TEXT,
            platform_product_id TEXT,
            platform_url TEXT,
            request_data TEXT,
            response_data TEXT,
            started_at TEXT,
            completed_at TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS registration_templates (
            id TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            template_name TEXT NOT NULL,
            template_data TEXT NOT NULL,
            template_kind TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            priority INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (platform, template_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_tokens_platform_active ON platform_tokens (platform, is_active)",
        "CREATE INDEX IF NOT EXISTS idx_accounts_platform ON platform_accounts (platform, is_active)",
        "CREATE INDEX IF NOT EXISTS idx_attempts_platform_status ON registration_attempts (platform, status)",
        "CREATE INDEX IF NOT EXISTS idx_attempts_status_retry ON registration_attempts (status, retry_count)",
        "CREATE INDEX IF NOT EXISTS idx_templates_lookup ON registration_templates (platform, template_kind, is_active, priority)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("database migrations applied");
    Ok(())
}
