use std::{
    fs,
    ops::{Deref, DerefMut},
    path::Path,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use sqlx::{
    Sqlite, SqliteConnection, SqlitePool, Transaction, migrate::Migrator,
    sqlite::SqliteConnectOptions,
};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::model::{LogEntry, OrderedListId, SavedItem, Scope};
use super::{oplog, recency};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored record is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("XDG data directory is unavailable")]
    MissingDataDir,
}

/// Transactional storage for the operation log, ordered item lists and
/// cached collections.
///
/// Every primitive in [`oplog`], [`recency`] and [`super::collections`] takes a
/// `&mut SqliteConnection`, so a caller groups them into one atomic unit by
/// running them against the same transaction from [`Store::begin`].
///
/// Transactions opened through one `Store` (and its clones) run one at a time.
/// SQLite fails a deferred transaction with `SQLITE_BUSY` when two of them
/// read and then both try to write, so writers queue on `write_lock` instead.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

/// A transaction holding the store's writer slot until it is committed,
/// rolled back or dropped. Dropping it rolls the transaction back.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
    _slot: OwnedMutexGuard<()>,
}

impl StoreTx {
    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

impl Deref for StoreTx {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        &self.tx
    }
}

impl DerefMut for StoreTx {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }
}

impl Store {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Self::from_pool(pool);
        store.init().await?;
        Ok(store)
    }

    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Another process holding the database makes us wait rather than fail.
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self::from_pool(pool);
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<StoreTx, StoreError> {
        let slot = Arc::clone(&self.write_lock).lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(StoreTx { tx, _slot: slot })
    }

    /// Pending entries of `scope` in commit order, for the dispatcher.
    pub async fn pending_operations(&self, scope: Scope) -> Result<Vec<LogEntry>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        oplog::entries(&mut conn, scope).await
    }

    /// Drops an entry whose remote effect has been confirmed.
    pub async fn confirm_operation(
        &self,
        scope: Scope,
        local_index: i64,
    ) -> Result<bool, StoreError> {
        let mut tx = self.begin().await?;
        let removed = oplog::remove_entry(&mut tx, scope, local_index).await?;
        tx.commit().await?;
        Ok(removed)
    }

    pub async fn saved_items(&self, list: OrderedListId) -> Result<Vec<SavedItem>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        recency::items(&mut conn, list).await
    }
}

pub fn default_db_path() -> Result<PathBuf, StoreError> {
    let mut path = dirs::data_dir().ok_or(StoreError::MissingDataDir)?;
    path.push("stickers-sync");
    path.push("state.db");
    Ok(path)
}

#[cfg(test)]
pub(crate) async fn memory_store() -> Store {
    use sqlx::sqlite::SqlitePoolOptions;

    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = Store::from_pool(pool);
    store.init().await.unwrap();
    store
}
