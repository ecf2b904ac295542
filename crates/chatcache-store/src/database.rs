//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! the store's migrations are run before any other operation.
//! [`StoreHandle`] wraps it in the lazily opened, memoized handle every store
//! shares across its async callers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::OnceCell;

use crate::error::{Result, StoreError};
use crate::migrations::{self, Schema};

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file for `schema` inside `dir`.
    pub fn open_in(dir: &Path, schema: &Schema, busy_timeout: Duration) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let db_path = dir.join(schema.file_name());

        tracing::info!(store = schema.name, path = %db_path.display(), "opening cache database");

        Self::open_at(&db_path, schema, busy_timeout)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path, schema: &Schema, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(busy_timeout)?;

        migrations::run_migrations(&conn, schema)?;

        Ok(Self { conn })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return a mutable reference to the underlying connection.
    ///
    /// Needed for [`rusqlite::Connection::transaction`].
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}

/// Lazily opened storage handle for one logical store.
///
/// The file is opened on first use and the connection is reused for the
/// lifetime of the handle.  Concurrent first callers await the same
/// initialization; a failed open is not memoized, so the next call retries.
/// All access is serialized through a mutex and runs on tokio's blocking pool.
pub struct StoreHandle {
    schema: &'static Schema,
    dir: PathBuf,
    busy_timeout: Duration,
    db: OnceCell<Arc<Mutex<Database>>>,
}

impl StoreHandle {
    pub fn new(schema: &'static Schema, dir: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            schema,
            dir: dir.into(),
            busy_timeout,
            db: OnceCell::new(),
        }
    }

    /// Logical store name (also the file stem).
    pub fn name(&self) -> &'static str {
        self.schema.name
    }

    /// Path of the backing file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(self.schema.file_name())
    }

    pub fn is_open(&self) -> bool {
        self.db.initialized()
    }

    /// Ensure the backing file, table and index exist.  Idempotent.
    pub async fn open(&self) -> Result<()> {
        self.database().await.map(|_| ())
    }

    async fn database(&self) -> Result<Arc<Mutex<Database>>> {
        let db = self
            .db
            .get_or_try_init(|| async {
                let schema = self.schema;
                let dir = self.dir.clone();
                let busy_timeout = self.busy_timeout;
                let db = tokio::task::spawn_blocking(move || {
                    Database::open_in(&dir, schema, busy_timeout)
                })
                .await??;
                Ok::<_, StoreError>(Arc::new(Mutex::new(db)))
            })
            .await?;
        Ok(Arc::clone(db))
    }

    /// Run `f` against the open database on the blocking pool.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
    {
        let db = self.database().await?;
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&db);
            f(&mut *guard)
        })
        .await?
    }
}

// A panic while holding the lock leaves SQLite itself consistent (any open
// transaction is rolled back on drop), so a poisoned mutex is still usable.
fn lock(db: &Mutex<Database>) -> MutexGuard<'_, Database> {
    db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
