//! Canonical DDL generation for the SQL backend.
//!
//! The migration engine decides whether a persisted table matches its
//! declared schema by comparing the table's actual `CREATE TABLE` text
//! (read back from `sqlite_master`) against a canonical regeneration from
//! the schema -- see `SPEC_FULL.md` §4.5 step 5. Generation here is
//! deterministic (stable column order) so the same schema always produces
//! byte-identical SQL.

use nsdb_types::{IndexSchema, StoreSchema};

use crate::config::Capabilities;

pub const PK_COLUMN: &str = "nsp_pk";
pub const DATA_COLUMN: &str = "nsp_data";

/// The name of the TEXT column backing a column-based index (a plain index,
/// or a full-text index with no native FTS support).
pub fn index_column(index_name: &str) -> String {
    format!("nsp_i_{index_name}")
}

/// The name of the side table backing a multi-entry index or a
/// natively-backed full-text index.
pub fn side_table_name(store_name: &str, index_name: &str) -> String {
    format!("{store_name}_{index_name}")
}

/// `true` if `index` is represented as a column on the base table rather
/// than a side table.
pub fn is_column_based(index: &IndexSchema, caps: &Capabilities) -> bool {
    if index.multi_entry {
        return false;
    }
    if index.full_text {
        return !caps.supports_native_fts;
    }
    true
}

/// Generates the canonical `CREATE TABLE` statement for `store`'s base
/// table under the given capabilities.
pub fn canonical_create_table_sql(store: &StoreSchema, caps: &Capabilities) -> String {
    let mut columns = vec![
        format!("{PK_COLUMN} TEXT PRIMARY KEY"),
        format!("{DATA_COLUMN} TEXT NOT NULL"),
    ];
    let mut index_names: Vec<&IndexSchema> = store
        .indexes
        .iter()
        .filter(|i| is_column_based(i, caps))
        .collect();
    index_names.sort_by(|a, b| a.name.cmp(&b.name));
    for index in index_names {
        columns.push(format!("{} TEXT", index_column(&index.name)));
    }
    format!(
        "CREATE TABLE {} ({})",
        quote_ident(&store.name),
        columns.join(", ")
    )
}

/// Generates the `CREATE INDEX` statements for every column-based,
/// non-unique-enforced secondary index on `store`. (Uniqueness is enforced
/// at the application level via `put`'s upsert semantics, not a SQL UNIQUE
/// constraint, since a `nsp_i_*` column may legitimately be NULL for
/// optional indexes.)
pub fn canonical_index_sql(store: &StoreSchema, caps: &Capabilities) -> Vec<String> {
    store
        .indexes
        .iter()
        .filter(|i| is_column_based(i, caps))
        .map(|i| {
            format!(
                "CREATE INDEX {} ON {} ({})",
                quote_ident(&format!("idx_{}_{}", store.name, i.name)),
                quote_ident(&store.name),
                index_column(&i.name)
            )
        })
        .collect()
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsdb_types::KeyPath;

    #[test]
    fn generation_is_deterministic() {
        let caps = Capabilities::sqlite_default();
        let store = StoreSchema::new("u", KeyPath::single("id"))
            .with_index(IndexSchema::new("b", KeyPath::single("b")))
            .with_index(IndexSchema::new("a", KeyPath::single("a")));
        assert_eq!(
            canonical_create_table_sql(&store, &caps),
            canonical_create_table_sql(&store, &caps)
        );
        assert!(canonical_create_table_sql(&store, &caps).contains("nsp_i_a"));
        assert!(canonical_create_table_sql(&store, &caps).contains("nsp_i_b"));
    }

    #[test]
    fn differs_when_index_added() {
        let caps = Capabilities::sqlite_default();
        let store1 = StoreSchema::new("u", KeyPath::single("id"));
        let store2 = StoreSchema::new("u", KeyPath::single("id"))
            .with_index(IndexSchema::new("byName", KeyPath::single("name")));
        assert_ne!(
            canonical_create_table_sql(&store1, &caps),
            canonical_create_table_sql(&store2, &caps)
        );
    }

    #[test]
    fn multi_entry_and_native_fts_indexes_are_not_columns() {
        let caps = Capabilities::sqlite_default();
        let multi = IndexSchema::new("byTag", KeyPath::single("tags")).multi_entry();
        assert!(!is_column_based(&multi, &caps));

        let fts_no_native = IndexSchema::new("bySearch", KeyPath::single("text")).full_text();
        assert!(is_column_based(&fts_no_native, &caps));

        let native_caps = Capabilities {
            supports_native_fts: true,
            ..caps
        };
        assert!(!is_column_based(&fts_no_native, &native_caps));
    }
}
