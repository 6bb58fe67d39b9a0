//! Persisted [`IndexMetadata`] -- the migration engine's record of what
//! shape each declared index had the last time the database was opened.
//!
//! Stored as one JSON row per index, keyed by `<storeName>_<indexName>`, in
//! the `metadata` table (SQL backing) or an equivalent key/value area
//! (cursor backing). Comparing the declared [`IndexSchema`] against the
//! persisted `IndexMetadata` is how drift is detected across opens.

use nsdb_types::IndexSchema;
use serde::{Deserialize, Serialize};

/// A persisted description of one index's declared shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub store_name: String,
    pub index: IndexSchema,
}

impl IndexMetadata {
    pub fn key(store_name: &str, index_name: &str) -> String {
        format!("{store_name}_{index_name}")
    }

    pub fn from_schema(store_name: &str, index: &IndexSchema) -> Self {
        IndexMetadata {
            store_name: store_name.to_string(),
            index: index.clone(),
        }
    }

    /// `true` if this persisted record matches the currently declared index
    /// exactly -- a mismatch of any kind (including a stale name) counts as
    /// drift per `SPEC_FULL.md` §4.5.
    pub fn matches(&self, store_name: &str, index: &IndexSchema) -> bool {
        self.store_name == store_name && &self.index == index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsdb_types::KeyPath;

    #[test]
    fn key_format() {
        assert_eq!(IndexMetadata::key("users", "byName"), "users_byName");
    }

    #[test]
    fn matches_detects_keypath_drift() {
        let idx_v1 = IndexSchema::new("byName", KeyPath::single("name"));
        let meta = IndexMetadata::from_schema("u", &idx_v1);
        let idx_v2 = IndexSchema::new("byName", KeyPath::single("nm"));
        assert!(meta.matches("u", &idx_v1));
        assert!(!meta.matches("u", &idx_v2));
    }
}
