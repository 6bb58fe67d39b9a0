//! The SQL (SQLite) backend: direct `rusqlite` access behind [`SqlBackend`],
//! no driver trait indirection -- see `driver.rs` for why the cursor backend
//! differs.

pub mod backend;
pub mod ddl;
pub mod fts;
pub mod index;
pub mod migration;
pub mod store;

pub use backend::{SqlBackend, SqlTransaction};
pub use fts::FtsOp;
