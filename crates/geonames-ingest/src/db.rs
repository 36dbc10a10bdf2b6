//! Connection pool lifecycle and schema migration

use geonames_common::config::DatabaseSettings;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

/// Database errors outside of a batch transaction
#[derive(Error, Debug)]
pub enum DbError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Database configuration is invalid or missing
    #[error("Database configuration error: {0}. Check DATABASE_URL and connection settings.")]
    Config(String),
}

impl DbError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Open the pool used for the whole run
///
/// The caller owns the pool and is expected to `close()` it on shutdown.
pub async fn create_pool(settings: &DatabaseSettings) -> DbResult<PgPool> {
    if settings.url.trim().is_empty() {
        return Err(DbError::config("database URL is empty"));
    }

    let pool = pool_options(settings).connect(&settings.url).await?;

    tracing::info!(
        max_connections = settings.max_connections,
        min_connections = settings.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Same options as [`create_pool`], without opening a connection yet
pub fn create_lazy_pool(settings: &DatabaseSettings) -> DbResult<PgPool> {
    Ok(pool_options(settings).connect_lazy(&settings.url)?)
}

fn pool_options(settings: &DatabaseSettings) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(settings.max_lifetime_secs))
}

pub async fn health_check(pool: &PgPool) -> DbResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(DbError::from)
}

/// Apply the bundled migrations (creates `locations` and its indexes)
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}
