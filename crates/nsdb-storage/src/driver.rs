//! The cursor-opener driver surface (C4, indexed-backing flavor).
//!
//! The SQL-backing flavor of C4 has no trait indirection in this crate: the
//! only SQL driver shipped is `rusqlite::Connection`, and the teacher's own
//! storage crate never abstracts SQL execution behind a trait either -- it
//! calls `rusqlite` directly throughout. The indexed-backing flavor is
//! different: a real browser IndexedDB factory is out of scope (see
//! `SPEC_FULL.md` §1), but the shared store/index runtime (§9's "two
//! top-level variants") still needs *some* concrete driver to run its tests
//! against, so this module defines the trait boundary plus an in-memory
//! reference implementation.
//!
//! A [`CursorDriver`] manages a set of named [`CursorTable`]s: one per
//! declared store (keyed by the store's primary key) and one per
//! column-based or multi-entry index (keyed by the index's serialized key,
//! with one row per `(key, primary-key)` pair so that multi-entry indexes
//! and ordinary indexes share the same shape).

use std::sync::Arc;

use crate::error::Result;

/// A single ordered `(key, ref) -> value` table backing either a store's
/// primary rows or one of its indexes.
pub trait CursorTable: Send + Sync {
    /// Inserts or replaces the row at `(key, refk)`.
    fn put(&self, key: &str, refk: &str, value: Vec<u8>);

    /// Looks up a row by `(key, refk)`.
    fn get(&self, key: &str, refk: &str) -> Option<Vec<u8>>;

    /// Removes every row whose `refk` equals `refk`, regardless of `key`.
    /// Used when repopulating an index for a primary key whose old values
    /// are unknown (the multi-entry "delete all then reinsert" pattern).
    fn remove_by_ref(&self, refk: &str);

    /// Empties the table.
    fn clear(&self);

    /// Returns `(key, refk, value)` rows with `key` in the given bound,
    /// ordered by `key` then `refk` (or the reverse, if `reverse`).
    fn range(
        &self,
        lower: Option<&str>,
        upper: Option<&str>,
        lower_excl: bool,
        upper_excl: bool,
        reverse: bool,
    ) -> Vec<(String, String, Vec<u8>)>;

    /// Counts rows with `key` in the given bound.
    fn count(&self, lower: Option<&str>, upper: Option<&str>, lower_excl: bool, upper_excl: bool) -> usize;
}

/// Opens and manages the named tables backing stores and indexes, and
/// performs the structural operations the migration engine needs
/// (create/drop store, create/drop index).
pub trait CursorDriver: Send + Sync {
    fn create_store(&self, store: &str);
    fn drop_store(&self, store: &str);
    fn has_store(&self, store: &str) -> bool;
    fn list_stores(&self) -> Vec<String>;

    fn create_index(&self, store: &str, index: &str);
    fn drop_index(&self, store: &str, index: &str);
    fn list_indexes(&self, store: &str) -> Vec<String>;

    /// The table backing a store's primary rows (`key` = serialized primary
    /// key, `refk` is always equal to `key` since primary keys are unique).
    fn primary(&self, store: &str) -> Result<Arc<dyn CursorTable>>;

    /// The table backing one index (`key` = serialized index value, `refk`
    /// = the referenced primary key; a plain index has at most one row per
    /// `refk`, a multi-entry index may have several).
    fn index(&self, store: &str, index: &str) -> Result<Arc<dyn CursorTable>>;
}
