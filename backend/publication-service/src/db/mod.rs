//! Database access layer.
//!
//! Repository functions take `&mut SqliteConnection` so the same code runs on
//! a pooled connection (`&mut *conn`) or inside a transaction (`&mut *tx`).

use crate::config::DatabaseConfig;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub mod follow_repo;
pub mod owner_repo;
pub mod post_repo;
pub mod section_repo;
pub mod tag_repo;
pub mod user_repo;
pub mod vote_repo;

/// Create the SQLite pool described by `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    debug!(
        url = %config.url,
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout_secs,
        busy_timeout_secs = config.busy_timeout_secs,
        "Creating database pool"
    );

    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    info!(url = %config.url, "Database pool created and verified successfully");

    Ok(pool)
}

/// Open a write transaction.
///
/// `BEGIN IMMEDIATE` takes SQLite's write lock up front, so a writer queues
/// on `busy_timeout` instead of failing with `SQLITE_BUSY` when it tries to
/// upgrade a read lock that another writer has already overtaken.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

/// Single-connection in-memory database with migrations applied.
///
/// The connection is never recycled, since dropping it would drop the
/// database with it.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::migrate::MigrateError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    debug!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations completed successfully");
    Ok(())
}
