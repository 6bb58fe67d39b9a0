//! Full-text search, indexed-backing variant (C7).
//!
//! There is no native FTS engine to defer to here, only the one shared
//! full-text index table (`token -> refk`). A term's match set is the
//! table's range `[term, prefix_successor(term))`, exactly the same
//! prefix-range trick the SQL fallback branch uses for its sentinel column.
//! And/Or just become set intersection/union of those per-term match sets.

use std::collections::HashSet;

use nsdb_types::{prefix_successor, tokenize, StoreSchema};

use crate::driver::CursorDriver;
use crate::error::{Result, StoreError};
pub use crate::sql::fts::FtsOp;

pub struct FtsRow {
    pub primary_key: String,
    pub data: String,
}

pub fn search(
    driver: &dyn CursorDriver,
    store: &StoreSchema,
    index_name: &str,
    phrase: &str,
    op: FtsOp,
) -> Result<Vec<FtsRow>> {
    let index = store
        .index(index_name)
        .ok_or_else(|| StoreError::index_not_found(&store.name, index_name))?;
    if !index.full_text {
        return Err(StoreError::invalid_argument(format!(
            "index {index_name:?} is not a full-text index"
        )));
    }

    let terms = tokenize(phrase);
    if terms.is_empty() {
        return Err(StoreError::invalid_argument("full-text query has no searchable terms"));
    }

    let table = driver.index(&store.name, index_name)?;
    let primary = driver.primary(&store.name)?;

    let mut sets: Vec<HashSet<String>> = Vec::with_capacity(terms.len());
    for term in &terms {
        let upper = prefix_successor(term);
        let rows = table.range(Some(term.as_str()), upper.as_deref(), false, true, false);
        sets.push(rows.into_iter().map(|(_, refk, _)| refk).collect());
    }

    let pks: HashSet<String> = match op {
        FtsOp::And => sets
            .into_iter()
            .reduce(|a, b| a.intersection(&b).cloned().collect())
            .unwrap_or_default(),
        FtsOp::Or => sets.into_iter().fold(HashSet::new(), |mut acc, s| {
            acc.extend(s);
            acc
        }),
    };

    let mut out = Vec::with_capacity(pks.len());
    for pk in pks {
        if let Some(data) = primary.get(&pk, &pk) {
            out.push(FtsRow {
                primary_key: pk,
                data: String::from_utf8(data)
                    .map_err(|e| StoreError::Internal(format!("stored item is not valid utf-8: {e}")))?,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Capabilities, ProviderConfig};
    use crate::cursor::memory::MemoryCursorDriver;
    use crate::cursor::migration;
    use crate::cursor::store::put_value;
    use nsdb_types::{IndexSchema, KeyPath, Schema};
    use serde_json::json;

    fn setup() -> (MemoryCursorDriver, StoreSchema) {
        let caps = Capabilities::indexed_default();
        let store = StoreSchema::new("docs", KeyPath::single("id"))
            .with_index(IndexSchema::new("bySearch", KeyPath::single("body")).full_text());
        let driver = MemoryCursorDriver::new();
        let schema = Schema::new(1, vec![store.clone()]);
        migration::migrate(&driver, &schema, &caps, &ProviderConfig::default()).unwrap();
        put_value(&driver, &store, &caps, &json!({"id": "d1", "body": "a quick brown fox"})).unwrap();
        put_value(&driver, &store, &caps, &json!({"id": "d2", "body": "category theory"})).unwrap();
        (driver, store)
    }

    #[test]
    fn or_query_matches_any_term() {
        let (driver, store) = setup();
        let rows = search(&driver, &store, "bySearch", "fox category", FtsOp::Or).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn and_query_requires_all_terms() {
        let (driver, store) = setup();
        let rows = search(&driver, &store, "bySearch", "quick fox", FtsOp::And).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].primary_key, "d1");
    }

    #[test]
    fn prefix_query_matches_longer_token() {
        let (driver, store) = setup();
        let rows = search(&driver, &store, "bySearch", "cat", FtsOp::Or).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].primary_key, "d2");
    }
}
