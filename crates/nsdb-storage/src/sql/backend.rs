//! The SQL-backed statement executor and its owned transaction guard.
//!
//! Mirrors the teacher's `SqliteStore` (`conn: Mutex<Connection>`) closely:
//! one physical connection, guarded by a mutex, with the logical admission
//! order and reader/writer fairness contract of §4.3 layered on top via
//! [`crate::lock::TransactionLock`]. A transaction is represented by an
//! owned [`SqlTransaction`] holding the connection's `MutexGuard` for its
//! whole lifetime and issuing `BEGIN`/`COMMIT`/`ROLLBACK` directly (rather
//! than `rusqlite::Transaction`, whose borrowed lifetime can't be bundled
//! into one struct together with the guard it borrows from).

use std::path::Path;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use tracing::debug;

use crate::config::Capabilities;
use crate::error::Result;

pub struct SqlBackend {
    pub(crate) conn: Mutex<Connection>,
    pub(crate) caps: Capabilities,
}

impl SqlBackend {
    pub fn open(path: impl AsRef<Path>, caps: Capabilities) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, caps)
    }

    pub fn open_in_memory(caps: Capabilities) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, caps)
    }

    fn from_connection(conn: Connection, caps: Capabilities) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(SqlBackend {
            conn: Mutex::new(conn),
            caps,
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub(crate) fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Begins a transaction, owning the connection's lock for its whole
    /// lifetime.
    pub(crate) fn begin(&self) -> Result<SqlTransaction<'_>> {
        SqlTransaction::begin(self.lock_conn())
    }
}

/// An owned, in-progress SQL transaction.
pub struct SqlTransaction<'a> {
    guard: MutexGuard<'a, Connection>,
    done: bool,
}

impl<'a> SqlTransaction<'a> {
    fn begin(guard: MutexGuard<'a, Connection>) -> Result<Self> {
        guard.execute_batch("BEGIN")?;
        Ok(SqlTransaction { guard, done: false })
    }

    pub fn conn(&self) -> &Connection {
        &self.guard
    }

    pub fn commit(mut self) -> Result<()> {
        self.guard.execute_batch("COMMIT")?;
        self.done = true;
        debug!("sql transaction committed");
        Ok(())
    }

    pub fn abort(mut self) -> Result<()> {
        self.guard.execute_batch("ROLLBACK")?;
        self.done = true;
        debug!("sql transaction rolled back");
        Ok(())
    }
}

impl Drop for SqlTransaction<'_> {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.guard.execute_batch("ROLLBACK");
        }
    }
}
