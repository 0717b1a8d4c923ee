//! Allowlist of trusted entities.
//!
//! Each allowed entity is vouched for by one or more sources (documents or
//! URLs). Retracting a source deletes its edges and then every entity left
//! without a backing source.
//!
//! Membership checks go to an in-memory set that mirrors the `text` column of
//! `allowed_entity`. The set is updated under the same writer lock as the
//! store, in an order that keeps `is_allowed` from ever reporting a text whose
//! row is not committed:
//!
//! - `add_entity`: commit, then insert into the set
//! - `remove_source`: evict from the set, then commit (restored on failure)
//! - `reset`: clear the set, drop the file, re-initialize

use crate::connection::is_in_memory;
use crate::error::{DatabaseError, Result};
use crate::Database;
use masque_core::EntityType;
use sqlx::{Pool, Sqlite, Transaction};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Mutex;

/// Maximum attempts for a store operation before giving up.
const MAX_ATTEMPTS: u32 = 3;

/// Base delay between attempts; grows linearly.
const RETRY_DELAY_MS: u64 = 50;

const SELECT_ORPHANS: &str =
    "SELECT text FROM allowed_entity WHERE text NOT IN (SELECT entity_text FROM entity_source)";

const DELETE_ORPHANS: &str =
    "DELETE FROM allowed_entity WHERE text NOT IN (SELECT entity_text FROM entity_source)";

/// An allowlisted entity together with the sources vouching for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedEntity {
    /// Exact entity text.
    pub text: String,
    /// Category recorded when the entity was first learned.
    pub entity_type: EntityType,
    /// Sources vouching for the entity, sorted.
    pub sources: Vec<String>,
}

/// Persistent entity/source registry with an in-memory membership cache.
pub struct AllowlistStore {
    path: PathBuf,
    /// Writer lock; `None` while the store is uninitialized.
    db: Mutex<Option<Database>>,
    allowed: RwLock<HashSet<String>>,
}

impl std::fmt::Debug for AllowlistStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllowlistStore")
            .field("path", &self.path)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl AllowlistStore {
    /// Open the store at `path`.
    ///
    /// Never fails: when storage cannot be opened the error is logged and the
    /// store stays uninitialized. Mutations then report
    /// `DatabaseError::StoreUnavailable` and `is_allowed` is always false.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match initialize(&path).await {
            Ok((db, texts)) => Self::ready(path, db, texts),
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to initialize allowlist store; continuing without it"
                );
                Self {
                    path,
                    db: Mutex::new(None),
                    allowed: RwLock::new(HashSet::new()),
                }
            }
        }
    }

    /// Open the store at `path`, propagating initialization errors.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the database cannot be opened, migrated or
    /// loaded.
    pub async fn try_open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (db, texts) = initialize(&path).await?;
        Ok(Self::ready(path, db, texts))
    }

    fn ready(path: PathBuf, db: Database, texts: HashSet<String>) -> Self {
        tracing::info!(
            path = %path.display(),
            entries = texts.len(),
            "Allowlist store initialized"
        );
        Self {
            path,
            db: Mutex::new(Some(db)),
            allowed: RwLock::new(texts),
        }
    }

    /// Location of the backing database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the backing storage is open.
    pub async fn is_initialized(&self) -> bool {
        self.db.lock().await.is_some()
    }

    /// Record that `source` vouches for `text`.
    ///
    /// Idempotent. The entity type of an already-known text is left as first
    /// recorded.
    ///
    /// # Errors
    /// Returns `DatabaseError::StoreUnavailable` if the store is not
    /// initialized, or the last storage error after bounded retries.
    pub async fn add_entity(&self, text: &str, entity_type: EntityType, source: &str) -> Result<()> {
        let guard = self.db.lock().await;
        let db = guard.as_ref().ok_or(DatabaseError::StoreUnavailable)?;

        with_retry("add_entity", || {
            insert_entity(db.pool(), text, entity_type, source)
        })
        .await?;

        self.write_set().insert(text.to_string());
        tracing::debug!(%entity_type, source, "Allowed entity");
        Ok(())
    }

    /// Retract every allowance granted by `source`.
    ///
    /// Entities still vouched for by another source survive. Returns the
    /// number of entities removed from the allowlist.
    ///
    /// # Errors
    /// Returns `DatabaseError::StoreUnavailable` if the store is not
    /// initialized, or the last storage error after bounded retries.
    pub async fn remove_source(&self, source: &str) -> Result<usize> {
        let guard = self.db.lock().await;
        let db = guard.as_ref().ok_or(DatabaseError::StoreUnavailable)?;

        let (tx, orphans) =
            with_retry("remove_source", || delete_source(db.pool(), source)).await?;

        {
            let mut set = self.write_set();
            for text in &orphans {
                set.remove(text);
            }
        }

        if let Err(e) = tx.commit().await {
            let mut set = self.write_set();
            set.extend(orphans);
            return Err(e.into());
        }

        tracing::info!(source, removed = orphans.len(), "Retracted allowlist source");
        Ok(orphans.len())
    }

    /// Whether `text` is allowlisted. Reads only the in-memory set.
    #[must_use]
    pub fn is_allowed(&self, text: &str) -> bool {
        self.read_set().contains(text)
    }

    /// Number of allowlisted entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_set().len()
    }

    /// Whether the allowlist is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_set().is_empty()
    }

    /// Look up a single entity and its sources.
    ///
    /// # Errors
    /// Returns `DatabaseError::StoreUnavailable` if the store is not
    /// initialized, `DatabaseError::Decode` if the stored type is unknown, or
    /// a query error.
    pub async fn lookup(&self, text: &str) -> Result<Option<AllowedEntity>> {
        let guard = self.db.lock().await;
        let db = guard.as_ref().ok_or(DatabaseError::StoreUnavailable)?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT entity_type FROM allowed_entity WHERE text = ?")
                .bind(text)
                .fetch_optional(db.pool())
                .await?;

        let Some((entity_type,)) = row else {
            return Ok(None);
        };
        let entity_type = entity_type
            .parse::<EntityType>()
            .map_err(|e| DatabaseError::Decode(e.to_string()))?;

        let sources: Vec<String> = sqlx::query_scalar(
            "SELECT source FROM entity_source WHERE entity_text = ? ORDER BY source",
        )
        .bind(text)
        .fetch_all(db.pool())
        .await?;

        Ok(Some(AllowedEntity {
            text: text.to_string(),
            entity_type,
            sources,
        }))
    }

    /// Destroy all persisted state and re-initialize empty.
    ///
    /// Also recovers a store whose first initialization failed.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the file cannot be removed or the fresh
    /// store cannot be initialized; the store is then left uninitialized.
    pub async fn reset(&self) -> Result<()> {
        let mut guard = self.db.lock().await;

        self.write_set().clear();
        if let Some(db) = guard.take() {
            db.close().await;
        }

        if !is_in_memory(&self.path) {
            remove_database_files(&self.path).await?;
        }

        let (db, texts) = initialize(&self.path).await?;
        *self.write_set() = texts;
        *guard = Some(db);

        tracing::warn!(path = %self.path.display(), "Allowlist store reset");
        Ok(())
    }

    /// Close the backing pool. The store becomes uninitialized.
    pub async fn close(&self) {
        if let Some(db) = self.db.lock().await.take() {
            db.close().await;
        }
        self.write_set().clear();
    }

    fn read_set(&self) -> RwLockReadGuard<'_, HashSet<String>> {
        self.allowed.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_set(&self) -> RwLockWriteGuard<'_, HashSet<String>> {
        self.allowed.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open, migrate, sweep orphans and load the allowed texts.
async fn initialize(path: &Path) -> Result<(Database, HashSet<String>)> {
    let db = Database::open(path).await?;

    let swept = sqlx::query(DELETE_ORPHANS)
        .execute(db.pool())
        .await?
        .rows_affected();
    if swept > 0 {
        tracing::info!(count = swept, "Removed orphaned allowlist entities");
    }

    let texts: Vec<String> = sqlx::query_scalar("SELECT text FROM allowed_entity")
        .fetch_all(db.pool())
        .await?;

    Ok((db, texts.into_iter().collect()))
}

async fn insert_entity(
    pool: &Pool<Sqlite>,
    text: &str,
    entity_type: EntityType,
    source: &str,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT OR IGNORE INTO allowed_entity (text, entity_type) VALUES (?, ?)")
        .bind(text)
        .bind(entity_type.as_str())
        .execute(&mut *tx)
        .await?;

    sqlx::query("INSERT OR IGNORE INTO entity_source (entity_text, source) VALUES (?, ?)")
        .bind(text)
        .bind(source)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Delete the edges of `source` and the entities left orphaned, returning the
/// uncommitted transaction and the orphaned texts.
async fn delete_source(
    pool: &Pool<Sqlite>,
    source: &str,
) -> Result<(Transaction<'static, Sqlite>, Vec<String>)> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM entity_source WHERE source = ?")
        .bind(source)
        .execute(&mut *tx)
        .await?;

    let orphans: Vec<String> = sqlx::query_scalar(SELECT_ORPHANS)
        .fetch_all(&mut *tx)
        .await?;

    sqlx::query(DELETE_ORPHANS).execute(&mut *tx).await?;

    Ok((tx, orphans))
}

async fn remove_database_files(path: &Path) -> Result<()> {
    let mut candidates = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        candidates.push(PathBuf::from(name));
    }

    for file in candidates {
        match tokio::fs::remove_file(&file).await {
            Ok(()) => tracing::debug!(file = %file.display(), "Removed database file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Whether an error may go away on its own (locked database, pool exhaustion).
fn is_transient(error: &DatabaseError) -> bool {
    matches!(error, DatabaseError::Sqlx(_))
}

/// Run `attempt` up to `MAX_ATTEMPTS` times with linear backoff, retrying only
/// transient errors.
async fn with_retry<T, F, Fut>(operation: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && tries < MAX_ATTEMPTS => {
                let delay = Duration::from_millis(RETRY_DELAY_MS * u64::from(tries));
                tracing::warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    operation,
                    tries,
                    MAX_ATTEMPTS,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!("{} failed after {} attempt(s): {}", operation, tries, e);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::IN_MEMORY;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn memory_store() -> AllowlistStore {
        AllowlistStore::try_open(IN_MEMORY)
            .await
            .expect("open in-memory store")
    }

    /// Log sink shared with a fmt subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            let bytes = self.0.lock().expect("lock captured logs").clone();
            String::from_utf8(bytes).expect("utf-8 logs")
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("lock captured logs").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_entity_text_never_logged() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(logs.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let store = memory_store().await;
        store
            .add_entity("jane@example.com", EntityType::Email, "doc1")
            .await
            .expect("add entity");
        store.remove_source("doc1").await.expect("remove source");

        let output = logs.contents();
        assert!(output.contains("Allowed entity"));
        assert!(output.contains("doc1"));
        assert!(!output.contains("jane@example.com"));
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let store = memory_store().await;

        store
            .add_entity("Acme", EntityType::Organization, "doc1")
            .await
            .expect("first add");
        store
            .add_entity("Acme", EntityType::Organization, "doc1")
            .await
            .expect("second add");

        assert_eq!(store.len(), 1);
        let entity = store.lookup("Acme").await.expect("lookup").expect("present");
        assert_eq!(entity.sources, vec!["doc1"]);
    }

    #[tokio::test]
    async fn test_first_entity_type_kept() {
        let store = memory_store().await;

        store
            .add_entity("Jordan", EntityType::Person, "doc1")
            .await
            .expect("add person");
        store
            .add_entity("Jordan", EntityType::Location, "doc2")
            .await
            .expect("add location");

        let entity = store.lookup("Jordan").await.expect("lookup").expect("present");
        assert_eq!(entity.entity_type, EntityType::Person);
        assert_eq!(entity.sources, vec!["doc1", "doc2"]);
    }

    #[tokio::test]
    async fn test_remove_unknown_source() {
        let store = memory_store().await;
        store
            .add_entity("a@b.io", EntityType::Email, "doc1")
            .await
            .expect("add");

        assert_eq!(store.remove_source("nope").await.expect("remove"), 0);
        assert!(store.is_allowed("a@b.io"));
    }

    #[tokio::test]
    async fn test_lookup_missing() {
        let store = memory_store().await;
        assert!(store.lookup("ghost").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn test_closed_store_unavailable() {
        let store = memory_store().await;
        store
            .add_entity("a@b.io", EntityType::Email, "doc1")
            .await
            .expect("add");
        store.close().await;

        assert!(!store.is_initialized().await);
        assert!(!store.is_allowed("a@b.io"));
        assert!(matches!(
            store.add_entity("x", EntityType::Person, "doc").await,
            Err(DatabaseError::StoreUnavailable)
        ));
        assert!(matches!(
            store.remove_source("doc1").await,
            Err(DatabaseError::StoreUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_reset_in_memory() {
        let store = memory_store().await;
        store
            .add_entity("a@b.io", EntityType::Email, "doc1")
            .await
            .expect("add");

        store.reset().await.expect("reset");

        assert!(store.is_initialized().await);
        assert!(store.is_empty());
        assert!(store.lookup("a@b.io").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_error() {
        let calls = AtomicU32::new(0);

        let value = with_retry("flaky", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(DatabaseError::Sqlx(sqlx::Error::PoolTimedOut))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .expect("second attempt succeeds");

        assert_eq!(value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry("broken", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DatabaseError::Sqlx(sqlx::Error::PoolTimedOut)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry("unavailable", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DatabaseError::StoreUnavailable) }
        })
        .await;

        assert!(matches!(result, Err(DatabaseError::StoreUnavailable)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
