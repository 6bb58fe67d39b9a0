//! In-memory reference implementation of [`CursorDriver`]/[`CursorTable`].
//!
//! Stands in for a browser IndexedDB factory (out of scope, see
//! `SPEC_FULL.md` §1) so the shared indexed-backing store/index/migration
//! runtime has a concrete, testable driver. A [`BTreeMap`] keyed on
//! `(key, refk)` gives the ordered-range semantics `CursorTable::range`
//! needs for free.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::driver::{CursorDriver, CursorTable};
use crate::error::{Result, StoreError};

/// One ordered `(key, refk) -> value` table.
pub struct MemoryTable {
    rows: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryTable {
    pub fn new() -> Self {
        MemoryTable {
            rows: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

fn in_bounds(key: &str, lower: Option<&str>, upper: Option<&str>, lower_excl: bool, upper_excl: bool) -> bool {
    if let Some(lower) = lower {
        if lower_excl {
            if key <= lower {
                return false;
            }
        } else if key < lower {
            return false;
        }
    }
    if let Some(upper) = upper {
        if upper_excl {
            if key >= upper {
                return false;
            }
        } else if key > upper {
            return false;
        }
    }
    true
}

impl CursorTable for MemoryTable {
    fn put(&self, key: &str, refk: &str, value: Vec<u8>) {
        self.rows.lock().insert((key.to_string(), refk.to_string()), value);
    }

    fn get(&self, key: &str, refk: &str) -> Option<Vec<u8>> {
        self.rows.lock().get(&(key.to_string(), refk.to_string())).cloned()
    }

    fn remove_by_ref(&self, refk: &str) {
        self.rows.lock().retain(|(_, r), _| r != refk);
    }

    fn clear(&self) {
        self.rows.lock().clear();
    }

    fn range(
        &self,
        lower: Option<&str>,
        upper: Option<&str>,
        lower_excl: bool,
        upper_excl: bool,
        reverse: bool,
    ) -> Vec<(String, String, Vec<u8>)> {
        let guard = self.rows.lock();
        let mut out: Vec<_> = guard
            .iter()
            .filter(|((k, _), _)| in_bounds(k, lower, upper, lower_excl, upper_excl))
            .map(|((k, r), v)| (k.clone(), r.clone(), v.clone()))
            .collect();
        if reverse {
            out.reverse();
        }
        out
    }

    fn count(&self, lower: Option<&str>, upper: Option<&str>, lower_excl: bool, upper_excl: bool) -> usize {
        self.rows
            .lock()
            .iter()
            .filter(|((k, _), _)| in_bounds(k, lower, upper, lower_excl, upper_excl))
            .count()
    }
}

/// An in-process [`CursorDriver`] backed entirely by [`MemoryTable`]s.
#[derive(Default)]
pub struct MemoryCursorDriver {
    stores: Mutex<HashMap<String, Arc<MemoryTable>>>,
    indexes: Mutex<HashMap<(String, String), Arc<MemoryTable>>>,
}

impl MemoryCursorDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorDriver for MemoryCursorDriver {
    fn create_store(&self, store: &str) {
        self.stores
            .lock()
            .entry(store.to_string())
            .or_insert_with(|| Arc::new(MemoryTable::new()));
    }

    fn drop_store(&self, store: &str) {
        self.stores.lock().remove(store);
        self.indexes.lock().retain(|(s, _), _| s != store);
    }

    fn has_store(&self, store: &str) -> bool {
        self.stores.lock().contains_key(store)
    }

    fn list_stores(&self) -> Vec<String> {
        self.stores.lock().keys().cloned().collect()
    }

    fn create_index(&self, store: &str, index: &str) {
        self.indexes
            .lock()
            .entry((store.to_string(), index.to_string()))
            .or_insert_with(|| Arc::new(MemoryTable::new()));
    }

    fn drop_index(&self, store: &str, index: &str) {
        self.indexes.lock().remove(&(store.to_string(), index.to_string()));
    }

    fn list_indexes(&self, store: &str) -> Vec<String> {
        self.indexes
            .lock()
            .keys()
            .filter(|(s, _)| s == store)
            .map(|(_, i)| i.clone())
            .collect()
    }

    fn primary(&self, store: &str) -> Result<Arc<dyn CursorTable>> {
        self.stores
            .lock()
            .get(store)
            .cloned()
            .map(|t| t as Arc<dyn CursorTable>)
            .ok_or_else(|| StoreError::store_not_found(store))
    }

    fn index(&self, store: &str, index: &str) -> Result<Arc<dyn CursorTable>> {
        self.indexes
            .lock()
            .get(&(store.to_string(), index.to_string()))
            .cloned()
            .map(|t| t as Arc<dyn CursorTable>)
            .ok_or_else(|| StoreError::index_not_found(store, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_lifecycle() {
        let driver = MemoryCursorDriver::new();
        assert!(!driver.has_store("widgets"));
        driver.create_store("widgets");
        assert!(driver.has_store("widgets"));
        assert_eq!(driver.list_stores(), vec!["widgets".to_string()]);
        driver.drop_store("widgets");
        assert!(!driver.has_store("widgets"));
    }

    #[test]
    fn dropping_store_drops_its_indexes() {
        let driver = MemoryCursorDriver::new();
        driver.create_store("widgets");
        driver.create_index("widgets", "byName");
        driver.drop_store("widgets");
        assert!(driver.index("widgets", "byName").is_err());
    }

    #[test]
    fn range_respects_exclusive_bounds() {
        let table = MemoryTable::new();
        table.put("a", "a", b"1".to_vec());
        table.put("b", "b", b"2".to_vec());
        table.put("c", "c", b"3".to_vec());
        let rows = table.range(Some("a"), Some("c"), true, true, false);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "b");
    }

    #[test]
    fn range_reverse_flips_order() {
        let table = MemoryTable::new();
        table.put("a", "a", b"1".to_vec());
        table.put("b", "b", b"2".to_vec());
        let asc = table.range(None, None, false, false, false);
        let desc = table.range(None, None, false, false, true);
        assert_eq!(asc[0].0, "a");
        assert_eq!(desc[0].0, "b");
    }

    #[test]
    fn remove_by_ref_deletes_every_matching_row() {
        let table = MemoryTable::new();
        table.put("tag1", "item1", vec![]);
        table.put("tag2", "item1", vec![]);
        table.put("tag1", "item2", vec![]);
        table.remove_by_ref("item1");
        assert_eq!(table.count(None, None, false, false), 1);
    }
}
