//! The top-level `Database`/`Transaction` facade (§6's external interface).
//!
//! Dispatches every operation to one of two backends, chosen once at
//! `open_database` and never again (§9's "two top-level variants" design
//! note): the direct-`rusqlite` [`SqlBackend`], or a [`CursorDriver`] trait
//! object (only the in-memory reference driver ships in this crate). Every
//! transaction is admitted through [`TransactionLock`] regardless of which
//! backend it targets.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument};

use nsdb_types::Schema;

use crate::config::{Capabilities, ProviderConfig};
use crate::cursor::{self, MemoryCursorDriver};
use crate::driver::CursorDriver;
use crate::error::{Result, StoreError};
use crate::lock::{TransactionLock, TxToken};
use crate::range::RangeBounds;
use crate::sql::{self, FtsOp, SqlBackend, SqlTransaction};

/// Which concrete backend a [`Database`] is running against.
pub enum StorageKind {
    /// A SQLite file on disk.
    Sqlite(PathBuf),
    /// A private, in-process SQLite database (used heavily in tests).
    SqliteInMemory,
    /// The in-memory [`MemoryCursorDriver`], standing in for a real
    /// IndexedDB-style factory.
    Cursor,
}

enum Backend {
    Sql(SqlBackend),
    Cursor(Arc<dyn CursorDriver>),
}

/// Range scans are capped at this many rows to rule out pathological SQL
/// (a caller-supplied `limit` above this is silently clamped down to it).
const MAX_RANGE_LIMIT: u64 = 1 << 32;

fn clamp_limit(limit: Option<usize>) -> Option<usize> {
    limit.map(|l| (l as u64).min(MAX_RANGE_LIMIT) as usize)
}

/// A materialized row returned from an index range scan, independent of
/// which backend produced it.
pub struct IndexRow {
    pub key: String,
    pub primary_key: String,
    pub data: String,
}

/// A materialized row returned from a full-text search, independent of
/// which backend produced it.
pub struct FtsRow {
    pub primary_key: String,
    pub data: String,
}

/// An open database: a declared [`Schema`], a chosen backend, and the
/// [`TransactionLock`] every transaction is admitted through.
pub struct Database {
    backend: Backend,
    schema: Schema,
    caps: Capabilities,
    config: ProviderConfig,
    lock: TransactionLock,
    sqlite_path: Option<PathBuf>,
}

/// Opens (creating and migrating if necessary) a database against `kind`
/// for the declared `schema`.
#[instrument(skip(schema, config), fields(version = schema.version))]
pub fn open_database(schema: Schema, kind: StorageKind, config: ProviderConfig) -> Result<Database> {
    schema.validate()?;

    let sqlite_path = match &kind {
        StorageKind::Sqlite(path) => Some(path.clone()),
        _ => None,
    };

    let (backend, caps) = match kind {
        StorageKind::Sqlite(path) => {
            let caps = Capabilities::sqlite_default();
            (Backend::Sql(SqlBackend::open(path, caps)?), caps)
        }
        StorageKind::SqliteInMemory => {
            let caps = Capabilities::sqlite_default();
            (Backend::Sql(SqlBackend::open_in_memory(caps)?), caps)
        }
        StorageKind::Cursor => {
            let caps = Capabilities::indexed_default();
            let driver: Arc<dyn CursorDriver> = Arc::new(MemoryCursorDriver::new());
            (Backend::Cursor(driver), caps)
        }
    };

    let run_migration = |result: Result<()>, config: &ProviderConfig| -> Result<()> {
        if let Err(e) = &result {
            config.notify_error(e);
        }
        result
    };

    match &backend {
        Backend::Sql(sql) => {
            let tx = sql.begin()?;
            run_migration(sql::migration::migrate(tx.conn(), &schema, &caps, &config), &config)?;
            tx.commit()?;
        }
        Backend::Cursor(driver) => {
            run_migration(cursor::migration::migrate(driver.as_ref(), &schema, &caps, &config), &config)?;
        }
    }

    info!("database opened");
    Ok(Database {
        backend,
        schema,
        caps,
        config,
        lock: TransactionLock::new(),
        sqlite_path,
    })
}

/// Deletes the on-disk file backing a `StorageKind::Sqlite` database. A
/// no-op for the in-memory variants, which simply vanish when dropped.
pub fn delete_database(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        std::fs::remove_file(path).map_err(|e| StoreError::Internal(format!("failed to delete database file: {e}")))?;
    }
    Ok(())
}

impl Database {
    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Blocks until a transaction over `stores` can be admitted. A `false`
    /// `write` grants read-only access; several readers may overlap.
    pub fn open_transaction(&self, stores: &[String], write: bool) -> Result<Transaction<'_>> {
        let token = self.lock.open_transaction(stores, write)?;
        let sql_tx = match &self.backend {
            Backend::Sql(sql) => Some(sql.begin().map_err(|e| {
                self.lock.fail(token);
                e
            })?),
            Backend::Cursor(_) => None,
        };
        Ok(Transaction {
            db: self,
            token: Some(token),
            sql_tx,
        })
    }

    /// Refuses new transactions and blocks until every in-flight one drains.
    pub fn close(&self) {
        self.lock.close_when_possible();
        self.lock.wait_until_drained();
        info!("database closed");
    }
}

/// A single admitted transaction. Dropping it without calling `commit` or
/// `abort` rolls it back (SQL backend) or simply releases its admission
/// slot (cursor backend, whose writes already landed directly).
pub struct Transaction<'db> {
    db: &'db Database,
    token: Option<TxToken>,
    sql_tx: Option<SqlTransaction<'db>>,
}

impl Transaction<'_> {
    fn store(&self, name: &str) -> Result<&nsdb_types::StoreSchema> {
        self.db
            .schema
            .store(name)
            .ok_or_else(|| StoreError::store_not_found(name))
    }

    pub fn get(&self, store: &str, primary_key: &str) -> Result<Option<String>> {
        let store = self.store(store)?;
        match (&self.sql_tx, &self.db.backend) {
            (Some(tx), _) => sql::store::get(tx.conn(), store, primary_key),
            (None, Backend::Cursor(driver)) => cursor::store::get(driver.as_ref(), store, primary_key),
            _ => unreachable!("sql_tx is None only for the cursor backend"),
        }
    }

    pub fn get_multiple(&self, store: &str, primary_keys: &[String]) -> Result<Vec<Option<String>>> {
        let store = self.store(store)?;
        match (&self.sql_tx, &self.db.backend) {
            (Some(tx), _) => sql::store::get_multiple(tx.conn(), store, primary_keys),
            (None, Backend::Cursor(driver)) => cursor::store::get_multiple(driver.as_ref(), store, primary_keys),
            _ => unreachable!("sql_tx is None only for the cursor backend"),
        }
    }

    pub fn put(&self, store: &str, items: &[serde_json::Value]) -> Result<()> {
        let store_schema = self.store(store)?;
        match (&self.sql_tx, &self.db.backend) {
            (Some(tx), _) => sql::store::put_many(tx.conn(), store_schema, &self.db.caps, items),
            (None, Backend::Cursor(driver)) => {
                cursor::store::put_many(driver.as_ref(), store_schema, &self.db.caps, items)
            }
            _ => unreachable!("sql_tx is None only for the cursor backend"),
        }
    }

    pub fn remove(&self, store: &str, primary_key: &str) -> Result<()> {
        let store_schema = self.store(store)?;
        match (&self.sql_tx, &self.db.backend) {
            (Some(tx), _) => sql::store::remove(tx.conn(), store_schema, &self.db.caps, primary_key),
            (None, Backend::Cursor(driver)) => cursor::store::remove(driver.as_ref(), store_schema, primary_key),
            _ => unreachable!("sql_tx is None only for the cursor backend"),
        }
    }

    pub fn clear(&self, store: &str) -> Result<()> {
        let store_schema = self.store(store)?;
        match (&self.sql_tx, &self.db.backend) {
            (Some(tx), _) => sql::store::clear_all_data(tx.conn(), store_schema, &self.db.caps),
            (None, Backend::Cursor(driver)) => cursor::store::clear_all_data(driver.as_ref(), store_schema),
            _ => unreachable!("sql_tx is None only for the cursor backend"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn range(
        &self,
        store: &str,
        index: &str,
        bounds: &RangeBounds,
        reverse: bool,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<IndexRow>> {
        let store_schema = self.store(store)?;
        let limit = clamp_limit(limit);
        match (&self.sql_tx, &self.db.backend) {
            (Some(tx), _) => {
                let rows = sql::index::range(tx.conn(), store_schema, &self.db.caps, index, bounds, reverse, offset, limit)?;
                Ok(rows
                    .into_iter()
                    .map(|r| IndexRow {
                        key: r.key,
                        primary_key: r.primary_key,
                        data: r.data,
                    })
                    .collect())
            }
            (None, Backend::Cursor(driver)) => {
                let rows = cursor::index::range(driver.as_ref(), store_schema, index, bounds, reverse, offset, limit)?;
                Ok(rows
                    .into_iter()
                    .map(|r| IndexRow {
                        key: r.key,
                        primary_key: r.primary_key,
                        data: r.data,
                    })
                    .collect())
            }
            _ => unreachable!("sql_tx is None only for the cursor backend"),
        }
    }

    /// Scans the store's primary-key range directly, without going through a
    /// secondary index -- the `openPrimaryKey()` view.
    pub fn range_primary(
        &self,
        store: &str,
        bounds: &RangeBounds,
        reverse: bool,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<IndexRow>> {
        let store_schema = self.store(store)?;
        let limit = clamp_limit(limit);
        match (&self.sql_tx, &self.db.backend) {
            (Some(tx), _) => {
                let rows = sql::index::range_primary(tx.conn(), store_schema, bounds, reverse, offset, limit)?;
                Ok(rows
                    .into_iter()
                    .map(|r| IndexRow {
                        key: r.key,
                        primary_key: r.primary_key,
                        data: r.data,
                    })
                    .collect())
            }
            (None, Backend::Cursor(driver)) => {
                let rows = cursor::index::range_primary(driver.as_ref(), store_schema, bounds, reverse, offset, limit)?;
                Ok(rows
                    .into_iter()
                    .map(|r| IndexRow {
                        key: r.key,
                        primary_key: r.primary_key,
                        data: r.data,
                    })
                    .collect())
            }
            _ => unreachable!("sql_tx is None only for the cursor backend"),
        }
    }

    pub fn count(&self, store: &str, index: &str, bounds: &RangeBounds) -> Result<u64> {
        let store_schema = self.store(store)?;
        match (&self.sql_tx, &self.db.backend) {
            (Some(tx), _) => sql::index::count(tx.conn(), store_schema, &self.db.caps, index, bounds),
            (None, Backend::Cursor(driver)) => cursor::index::count(driver.as_ref(), store_schema, index, bounds),
            _ => unreachable!("sql_tx is None only for the cursor backend"),
        }
    }

    /// Counts rows in the store's primary-key range directly, mirroring
    /// `range_primary`.
    pub fn count_primary(&self, store: &str, bounds: &RangeBounds) -> Result<u64> {
        let store_schema = self.store(store)?;
        match (&self.sql_tx, &self.db.backend) {
            (Some(tx), _) => sql::index::count_primary(tx.conn(), store_schema, bounds),
            (None, Backend::Cursor(driver)) => cursor::index::count_primary(driver.as_ref(), store_schema, bounds),
            _ => unreachable!("sql_tx is None only for the cursor backend"),
        }
    }

    pub fn search(&self, store: &str, index: &str, phrase: &str, op: FtsOp) -> Result<Vec<FtsRow>> {
        let store_schema = self.store(store)?;
        match (&self.sql_tx, &self.db.backend) {
            (Some(tx), _) => {
                let rows = sql::fts::search(tx.conn(), store_schema, &self.db.caps, index, phrase, op)?;
                Ok(rows
                    .into_iter()
                    .map(|r| FtsRow {
                        primary_key: r.primary_key,
                        data: r.data,
                    })
                    .collect())
            }
            (None, Backend::Cursor(driver)) => {
                let rows = cursor::fts::search(driver.as_ref(), store_schema, index, phrase, op)?;
                Ok(rows
                    .into_iter()
                    .map(|r| FtsRow {
                        primary_key: r.primary_key,
                        data: r.data,
                    })
                    .collect())
            }
            _ => unreachable!("sql_tx is None only for the cursor backend"),
        }
    }

    /// Commits the transaction, releasing its admission slot.
    pub fn commit(mut self) -> Result<()> {
        if let Some(tx) = self.sql_tx.take() {
            tx.commit()?;
        }
        if let Some(token) = self.token.take() {
            self.db.lock.complete(token);
        }
        Ok(())
    }

    /// Aborts the transaction, discarding any writes (SQL backend) and
    /// releasing its admission slot.
    pub fn abort(mut self) -> Result<()> {
        if let Some(tx) = self.sql_tx.take() {
            tx.abort()?;
        }
        if let Some(token) = self.token.take() {
            self.db.lock.fail(token);
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.db.lock.fail(token);
        }
    }
}
