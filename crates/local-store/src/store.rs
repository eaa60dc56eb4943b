//! Async store handle over a dedicated SQLite thread.
//!
//! All work runs on the tokio-rusqlite executor thread. Only SQL and
//! lightweight row mapping belong inside a [`Store::transaction`] closure.
//! The closure is synchronous, so no network or other async work can be
//! awaited while a transaction is open.
//!
//! When the durable file cannot be used the store degrades to an in-memory
//! database. This happens at open time (directory or file cannot be
//! created) or on the first write that fails with a storage-level error. On
//! a runtime switch every existing record is copied into memory first, the
//! failing call still reports [`StoreError::StorageUnavailable`], and every
//! later call runs against the in-memory copy.

use crate::schema::{CollectionSchema, Schemas};
use crate::txn::StoreTxn;
use crate::{migrations, Key, StoreError, StoreResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rusqlite::Connection;
use tracing::{debug, error, info, warn};

/// Convert a tokio_rusqlite::Error to StoreError.
fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => StoreError::from(e),
        tokio_rusqlite::Error::Close(_) => StoreError::Connection("Connection closed".to_string()),
        other => StoreError::Connection(other.to_string()),
    }
}

/// Where records currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Durable,
    MemoryOnly,
}

struct Backend {
    conn: Connection,
    mode: StorageMode,
}

struct StoreInner {
    backend: RwLock<Backend>,
    schemas: Arc<Schemas>,
    path: Option<PathBuf>,
    degrade_lock: tokio::sync::Mutex<()>,
}

/// Durable collection store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Open a store at the given path.
    ///
    /// Falls back to memory-only mode when the file or its directory cannot
    /// be created. Other failures (corruption, bad migrations) are returned.
    pub async fn open(
        path: &Path,
        collections: impl IntoIterator<Item = CollectionSchema>,
    ) -> StoreResult<Self> {
        let schemas = Arc::new(Schemas::new(collections));
        match open_durable(path).await {
            Ok(conn) => Ok(Self::from_parts(conn, StorageMode::Durable, schemas, Some(path))),
            Err(StoreError::StorageUnavailable(reason)) => {
                warn!(path = %path.display(), reason = %reason, "Durable storage unavailable, using memory-only store");
                let conn = open_memory().await?;
                Ok(Self::from_parts(conn, StorageMode::MemoryOnly, schemas, Some(path)))
            }
            Err(StoreError::Io(e)) => {
                warn!(path = %path.display(), error = %e, "Cannot create store directory, using memory-only store");
                let conn = open_memory().await?;
                Ok(Self::from_parts(conn, StorageMode::MemoryOnly, schemas, Some(path)))
            }
            Err(e) => Err(e),
        }
    }

    /// Open a store that never touches disk.
    pub async fn open_in_memory(
        collections: impl IntoIterator<Item = CollectionSchema>,
    ) -> StoreResult<Self> {
        let schemas = Arc::new(Schemas::new(collections));
        let conn = open_memory().await?;
        Ok(Self::from_parts(conn, StorageMode::MemoryOnly, schemas, None))
    }

    fn from_parts(
        conn: Connection,
        mode: StorageMode,
        schemas: Arc<Schemas>,
        path: Option<&Path>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                backend: RwLock::new(Backend { conn, mode }),
                schemas,
                path: path.map(Path::to_path_buf),
                degrade_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn mode(&self) -> StorageMode {
        self.inner.backend.read().mode
    }

    /// Path of the durable file, if one was requested.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Run `f` inside one SQLite transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise.
    pub async fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&StoreTxn<'_>) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let schemas = Arc::clone(&self.inner.schemas);
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let value = f(&StoreTxn::new(&tx, &schemas))?;
            tx.commit()?;
            Ok(value)
        })
        .await
    }

    pub async fn get(&self, collection: &str, key: Key) -> StoreResult<Option<Value>> {
        let collection = collection.to_string();
        self.transaction(move |tx| tx.get(&collection, &key)).await
    }

    pub async fn put(&self, collection: &str, record: Value) -> StoreResult<Key> {
        let collection = collection.to_string();
        self.transaction(move |tx| tx.put(&collection, record)).await
    }

    pub async fn delete(&self, collection: &str, key: Key) -> StoreResult<bool> {
        let collection = collection.to_string();
        self.transaction(move |tx| tx.delete(&collection, &key)).await
    }

    pub async fn get_all(&self, collection: &str) -> StoreResult<Vec<Value>> {
        let collection = collection.to_string();
        self.transaction(move |tx| tx.get_all(&collection)).await
    }

    pub async fn get_all_by_index(
        &self,
        collection: &str,
        index: &str,
        value: Value,
    ) -> StoreResult<Vec<Value>> {
        let collection = collection.to_string();
        let index = index.to_string();
        self.transaction(move |tx| tx.get_all_by_index(&collection, &index, &value))
            .await
    }

    pub async fn count(&self, collection: &str) -> StoreResult<usize> {
        let collection = collection.to_string();
        self.transaction(move |tx| tx.count(&collection)).await
    }

    pub async fn clear(&self, collection: &str) -> StoreResult<usize> {
        let collection = collection.to_string();
        self.transaction(move |tx| tx.clear(&collection)).await
    }

    /// Check the store answers a trivial query.
    pub async fn health_check(&self) -> StoreResult<()> {
        self.call(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(())
        })
        .await
    }

    /// Close the underlying connection. Later calls fail with
    /// [`StoreError::Connection`].
    pub async fn close(&self) -> StoreResult<()> {
        let conn = self.inner.backend.read().conn.clone();
        conn.close().await.map_err(from_tokio_rusqlite)
    }

    /// Execute a closure on the current connection, degrading to memory on
    /// storage-level failures.
    async fn call<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.inner.backend.read().conn.clone();
        let outer_result = conn.call(move |conn| Ok(f(conn))).await;
        let result = match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        };

        let unavailable = match &result {
            Err(StoreError::StorageUnavailable(reason)) => Some(reason.clone()),
            _ => None,
        };
        if let Some(reason) = unavailable {
            self.degrade(&reason).await;
        }
        result
    }

    /// Switch to an in-memory copy of the current contents.
    async fn degrade(&self, reason: &str) {
        let _guard = self.inner.degrade_lock.lock().await;
        let old = {
            let backend = self.inner.backend.read();
            if backend.mode == StorageMode::MemoryOnly {
                return;
            }
            backend.conn.clone()
        };

        warn!(reason = %reason, "Durable storage failed, switching to memory-only mode");

        let snapshot = match old.call(|conn| Ok(Snapshot::capture(conn))).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                error!(error = %e, "Could not copy records out of durable storage");
                Snapshot::default()
            }
            Err(e) => {
                error!(error = %e, "Could not copy records out of durable storage");
                Snapshot::default()
            }
        };

        let memory = match open_memory().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "Could not open in-memory store, staying on durable backend");
                return;
            }
        };

        let copied = snapshot.records.len();
        let restore = memory.call(move |conn| Ok(snapshot.restore(conn))).await;
        match restore {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Partial copy into memory-only store"),
            Err(e) => error!(error = %e, "Partial copy into memory-only store"),
        }

        let mut backend = self.inner.backend.write();
        backend.conn = memory;
        backend.mode = StorageMode::MemoryOnly;
        info!(records = copied, "Store now running memory-only");
    }

    /// Make the durable connection refuse writes, as a full or revoked
    /// device would.
    #[cfg(test)]
    pub(crate) async fn simulate_storage_loss(&self) -> StoreResult<()> {
        let conn = self.inner.backend.read().conn.clone();
        conn.call(|conn| {
            conn.execute_batch("PRAGMA query_only = ON")?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)
    }
}

async fn open_durable(path: &Path) -> StoreResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!(path = %path.display(), "Opening local store");

    let conn = Connection::open(path).await.map_err(from_tokio_rusqlite)?;

    conn.call(|conn| {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Ok(migrations::run_migrations(conn))
    })
    .await
    .map_err(from_tokio_rusqlite)??;

    debug!(path = %path.display(), "Local store initialized with WAL mode");
    Ok(conn)
}

async fn open_memory() -> StoreResult<Connection> {
    let conn = Connection::open_in_memory()
        .await
        .map_err(from_tokio_rusqlite)?;
    conn.call(|conn| Ok(migrations::run_migrations(conn)))
        .await
        .map_err(from_tokio_rusqlite)??;
    Ok(conn)
}

/// Raw copy of every store table.
#[derive(Default)]
struct Snapshot {
    records: Vec<(String, Key, String)>,
    index_entries: Vec<(String, String, String, Key)>,
    sequences: Vec<(String, i64)>,
}

impl Snapshot {
    fn capture(conn: &rusqlite::Connection) -> StoreResult<Self> {
        let records = conn
            .prepare("SELECT collection, record_key, value FROM store_records")?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let index_entries = conn
            .prepare(
                "SELECT collection, index_name, index_value, record_key FROM store_index_entries",
            )?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let sequences = conn
            .prepare("SELECT collection, next_key FROM store_sequences")?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            records,
            index_entries,
            sequences,
        })
    }

    fn restore(self, conn: &mut rusqlite::Connection) -> StoreResult<()> {
        let tx = conn.transaction()?;
        for (collection, key, value) in &self.records {
            tx.execute(
                "INSERT INTO store_records (collection, record_key, value) VALUES (?1, ?2, ?3)",
                rusqlite::params![collection, key, value],
            )?;
        }
        for (collection, index, value, key) in &self.index_entries {
            tx.execute(
                "INSERT INTO store_index_entries (collection, index_name, index_value, record_key)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![collection, index, value, key],
            )?;
        }
        for (collection, next) in &self.sequences {
            tx.execute(
                "INSERT INTO store_sequences (collection, next_key) VALUES (?1, ?2)",
                rusqlite::params![collection, next],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
