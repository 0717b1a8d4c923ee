//! Masque Database Layer
//!
//! Persists the allowlist of trusted entities in `SQLite`. Uses `SQLx` with
//! embedded migrations.
//!
//! # Architecture
//!
//! - **Schema**: `allowed_entity` (keyed by entity text) and `entity_source`
//!   (one row per source vouching for an entity)
//! - **Migrations**: SQL migrations are embedded and versioned using `SQLx`
//! - **Cache**: [`AllowlistStore`] mirrors the allowed texts in memory so
//!   membership checks never hit the database
//!
//! # Example
//!
//! ```ignore
//! use masque_core::EntityType;
//! use masque_db::AllowlistStore;
//!
//! let store = AllowlistStore::open("allowedlist.db").await;
//! store.add_entity("jane@example.com", EntityType::Email, "handbook.pdf").await?;
//! assert!(store.is_allowed("jane@example.com"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod allowlist;
pub mod connection;
pub mod error;
pub mod migrations;

pub use allowlist::{AllowedEntity, AllowlistStore};
pub use error::{DatabaseError, Result};

use sqlx::{Pool, Sqlite};
use std::path::Path;

/// Migrated connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (creating if needed) the database at `path` and apply pending
    /// migrations.
    ///
    /// # Arguments
    /// * `path` - Path to the database file (or `:memory:` for in-memory)
    ///
    /// # Errors
    /// Returns `DatabaseError` if the database cannot be opened or migrated.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let pool = connection::open_pool(path.as_ref()).await?;
        migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Get the current schema version.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the version cannot be queried.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(&self.pool).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the connection pool.
    ///
    /// Waits for all connections to be returned and closes them.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_applies_migrations() {
        let db = Database::open(":memory:").await.expect("open database");
        assert_eq!(db.get_schema_version().await.expect("get version"), 1);
        db.close().await;
    }
}
