//! Database connection management.
//!
//! Opens a `SQLx` `SQLite` pool on a file (created on demand, parent
//! directories included) or on a shared in-memory database.

use crate::error::{DatabaseError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Path that selects an in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Whether `path` names the in-memory database rather than a file.
#[must_use]
pub fn is_in_memory(path: &Path) -> bool {
    path.as_os_str() == IN_MEMORY
}

/// Open a connection pool for `path`.
///
/// # Errors
/// Returns `DatabaseError` if:
/// - The parent directory cannot be created
/// - The path is not valid UTF-8
/// - The database file cannot be opened or created
pub async fn open_pool(path: &Path) -> Result<Pool<Sqlite>> {
    let connect_options = if is_in_memory(path) {
        SqliteConnectOptions::from_str(IN_MEMORY)
            .map_err(|e| DatabaseError::Open(format!("invalid connection string: {e}")))?
    } else {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let path_str = path.to_str().ok_or_else(|| {
            DatabaseError::Open("invalid database path: not valid UTF-8".to_string())
        })?;
        SqliteConnectOptions::new()
            .filename(path_str)
            .create_if_missing(true)
    }
    .foreign_keys(true)
    .busy_timeout(Duration::from_secs(5));

    // An in-memory database lives as long as its last connection.
    let pool_options = if is_in_memory(path) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options
        .connect_with(connect_options)
        .await
        .map_err(|e| DatabaseError::Open(format!("failed to initialize pool: {e}")))?;

    tracing::info!("Database pool created at {}", path.display());

    Ok(pool)
}
