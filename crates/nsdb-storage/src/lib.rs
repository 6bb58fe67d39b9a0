//! Schema migration, indexing, and query engine for the nsdb indexed object
//! store.
//!
//! Two independent backend implementations share the domain types from
//! `nsdb-types` and the crate-root infrastructure here (error types,
//! capability flags, the transaction admission lock, persisted index
//! metadata, and range bounds):
//!
//! - `sql`: a SQLite backend, talking to `rusqlite::Connection` directly.
//! - `cursor`: an IndexedDB-style backend behind the [`driver::CursorDriver`]
//!   trait, with an in-memory reference driver since no real browser factory
//!   is in scope.
//!
//! [`database::Database`] is the facade unifying both: it picks a backend
//! once at `open_database` and dispatches every subsequent operation to it.

pub mod config;
pub mod cursor;
pub mod database;
pub mod driver;
pub mod error;
pub mod lock;
pub mod metadata;
pub mod range;
pub mod sql;

pub use config::{Capabilities, ProviderConfig};
pub use database::{delete_database, open_database, Database, FtsRow, IndexRow, StorageKind, Transaction};
pub use error::{Result, StoreError};
pub use range::RangeBounds;
pub use sql::FtsOp;
