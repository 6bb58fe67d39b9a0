//! Schema, key-path, and full-text tokenization types shared by every
//! backend of the nsdb indexed object store.
//!
//! This crate contains no persistence logic -- it is the domain vocabulary
//! (`Schema`, `IndexSchema`, `KeyPath`) and the two pure-function helpers
//! (`keypath::KeyPath::serialize_values`, `tokenize::tokenize`) that both the
//! SQL and cursor backends in `nsdb-storage` build on.

pub mod keypath;
pub mod schema;
pub mod tokenize;

pub use keypath::{KeyPath, KeyPathError};
pub use schema::{IndexSchema, Schema, SchemaError, StoreSchema};
pub use tokenize::{prefix_successor, tokenize};
