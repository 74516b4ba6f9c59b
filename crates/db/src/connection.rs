use std::time::Duration;

use signoff_core::DatabaseConfig;
use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

/// Applied to every pooled connection. The approvals workload is a single
/// writer doing read-modify-write on one order row at a time, so WAL with
/// relaxed sync and a generous busy timeout fits it.
const CONNECTION_PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode = WAL",
    "PRAGMA synchronous = NORMAL",
    "PRAGMA foreign_keys = ON",
    "PRAGMA busy_timeout = 5000",
];

pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    pool(
        &config.url,
        config.max_connections.max(1),
        Duration::from_secs(config.timeout_secs.max(1)),
    )
    .await
}

/// Single-connection pool, used by tests and one-off tooling against
/// in-memory databases.
pub async fn connect_single(database_url: &str) -> Result<DbPool, sqlx::Error> {
    pool(database_url, 1, Duration::from_secs(5)).await
}

async fn pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                for pragma in CONNECTION_PRAGMAS {
                    sqlx::query(pragma).execute(&mut *conn).await?;
                }
                Ok(())
            })
        })
        .connect(database_url)
        .await
}
