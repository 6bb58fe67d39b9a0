//! Full-text search, SQL variant (C7).
//!
//! Two branches, selected once per index by [`is_column_based`]:
//!
//! - **Native** (`caps.supports_native_fts`): terms live one-per-row in an
//!   FTS5 virtual side table. A query becomes one `MATCH '<term>*'` subquery
//!   per term, combined with `INTERSECT` (And) or `UNION` (Or), then joined
//!   back to the base table for the item payload.
//! - **Fallback**: every item's tokens are concatenated into one `TEXT`
//!   column on the base table, delimited by [`FTS_SENTINEL`] on both sides
//!   of each token (`^$^word1^$^word2^$^`). A term query becomes a `LIKE
//!   '%^$^term%'` clause per term -- the sentinel anchors the match to a
//!   token boundary so a search for `"cat"` can't match the tail of
//!   `"muscat"`, while still matching `"category"` as a prefix.

use rusqlite::{Connection, ToSql, params_from_iter};

use nsdb_types::{tokenize, StoreSchema};

use crate::config::Capabilities;
use crate::error::{Result, StoreError};
use crate::sql::ddl::{self, is_column_based};

/// Delimits tokens within the fallback FTS column. Chosen to be vanishingly
/// unlikely to occur in real text and impossible to confuse with a LIKE
/// wildcard.
pub const FTS_SENTINEL: &str = "^$^";

/// How multiple search terms combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtsOp {
    And,
    Or,
}

pub struct FtsRow {
    pub primary_key: String,
    pub data: String,
}

pub fn search(
    conn: &Connection,
    store: &StoreSchema,
    caps: &Capabilities,
    index_name: &str,
    phrase: &str,
    op: FtsOp,
) -> Result<Vec<FtsRow>> {
    let index = store
        .index(index_name)
        .ok_or_else(|| StoreError::IndexNotFound {
            store: store.name.clone(),
            index: index_name.to_string(),
        })?;
    if !index.full_text {
        return Err(StoreError::invalid_argument(format!(
            "index {index_name:?} is not a full-text index"
        )));
    }

    let terms = tokenize(phrase);
    if terms.is_empty() {
        return Err(StoreError::invalid_argument("full-text query has no searchable terms"));
    }

    if is_column_based(index, caps) {
        search_fallback(conn, store, index_name, &terms, op)
    } else {
        search_native(conn, store, index_name, &terms, op)
    }
}

fn search_native(
    conn: &Connection,
    store: &StoreSchema,
    index_name: &str,
    terms: &[String],
    op: FtsOp,
) -> Result<Vec<FtsRow>> {
    let table = ddl::side_table_name(&store.name, index_name);
    let set_op = match op {
        FtsOp::And => "INTERSECT",
        FtsOp::Or => "UNION",
    };
    let subqueries: Vec<String> = terms
        .iter()
        .map(|_| format!("SELECT nsp_refpk FROM \"{table}\" WHERE nsp_token MATCH ?"))
        .collect();
    let refpk_sql = subqueries.join(&format!(" {set_op} "));
    let sql = format!(
        "SELECT b.\"{}\", b.\"{}\" FROM ({refpk_sql}) r JOIN \"{}\" b ON r.nsp_refpk = b.\"{}\"",
        ddl::PK_COLUMN,
        ddl::DATA_COLUMN,
        store.name,
        ddl::PK_COLUMN,
    );
    let bindings: Vec<String> = terms.iter().map(|t| format!("{}*", sanitize_fts_term(t))).collect();
    let params: Vec<&dyn ToSql> = bindings.iter().map(|b| b as &dyn ToSql).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params), |row| {
        Ok(FtsRow {
            primary_key: row.get(0)?,
            data: row.get(1)?,
        })
    })?;
    rows.map(|r| r.map_err(StoreError::from)).collect()
}

fn search_fallback(
    conn: &Connection,
    store: &StoreSchema,
    index_name: &str,
    terms: &[String],
    op: FtsOp,
) -> Result<Vec<FtsRow>> {
    let column = ddl::index_column(index_name);
    let joiner = match op {
        FtsOp::And => " AND ",
        FtsOp::Or => " OR ",
    };
    let where_sql = terms
        .iter()
        .enumerate()
        .map(|(i, _)| format!("\"{column}\" LIKE ?{} ESCAPE '\\'", i + 1))
        .collect::<Vec<_>>()
        .join(joiner);

    let sql = format!(
        "SELECT \"{}\", \"{}\" FROM \"{}\" WHERE {where_sql}",
        ddl::PK_COLUMN,
        ddl::DATA_COLUMN,
        store.name,
    );
    let bindings: Vec<String> = terms
        .iter()
        .map(|t| format!("%{FTS_SENTINEL}{}%", escape_like(t)))
        .collect();
    let params: Vec<&dyn ToSql> = bindings.iter().map(|b| b as &dyn ToSql).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params), |row| {
        Ok(FtsRow {
            primary_key: row.get(0)?,
            data: row.get(1)?,
        })
    })?;
    rows.map(|r| r.map_err(StoreError::from)).collect()
}

/// Strips characters with special meaning in an FTS5 query string. Tokens
/// produced by [`tokenize`] never contain these, but a defensive strip keeps
/// a hand-built term from accidentally becoming FTS5 query syntax.
fn sanitize_fts_term(term: &str) -> String {
    term.chars()
        .filter(|c| !matches!(c, '"' | '(' | ')' | '*' | ':' | '^' | '-'))
        .collect()
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::store::put_value;
    use nsdb_types::{IndexSchema, KeyPath};
    use rusqlite::Connection;
    use serde_json::json;

    fn setup_fallback() -> (Connection, StoreSchema, Capabilities) {
        let caps = Capabilities::sqlite_default();
        let store = StoreSchema::new("docs", KeyPath::single("id"))
            .with_index(IndexSchema::new("bySearch", KeyPath::single("body")).full_text());
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&ddl::canonical_create_table_sql(&store, &caps)).unwrap();
        for stmt in ddl::canonical_index_sql(&store, &caps) {
            conn.execute_batch(&stmt).unwrap();
        }
        put_value(&conn, &store, &caps, &json!({"id": "d1", "body": "a quick brown fox"})).unwrap();
        put_value(&conn, &store, &caps, &json!({"id": "d2", "body": "category theory"})).unwrap();
        put_value(&conn, &store, &caps, &json!({"id": "d3", "body": "quick cats everywhere"})).unwrap();
        (conn, store, caps)
    }

    #[test]
    fn or_query_matches_any_term() {
        let (conn, store, caps) = setup_fallback();
        let rows = search(&conn, &store, &caps, "bySearch", "fox category", FtsOp::Or).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.primary_key.as_str()).collect();
        assert!(ids.contains(&"d1"));
        assert!(ids.contains(&"d2"));
        assert!(!ids.contains(&"d3"));
    }

    #[test]
    fn and_query_requires_all_terms() {
        let (conn, store, caps) = setup_fallback();
        let rows = search(&conn, &store, &caps, "bySearch", "quick fox", FtsOp::And).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].primary_key, "d1");
    }

    #[test]
    fn and_result_is_subset_of_or_result() {
        let (conn, store, caps) = setup_fallback();
        let and_rows = search(&conn, &store, &caps, "bySearch", "quick fox", FtsOp::And).unwrap();
        let or_rows = search(&conn, &store, &caps, "bySearch", "quick fox", FtsOp::Or).unwrap();
        assert!(and_rows.len() <= or_rows.len());
        let or_ids: std::collections::HashSet<&str> = or_rows.iter().map(|r| r.primary_key.as_str()).collect();
        assert!(and_rows.iter().all(|r| or_ids.contains(r.primary_key.as_str())));
    }

    #[test]
    fn prefix_matches_longer_token() {
        let (conn, store, caps) = setup_fallback();
        let rows = search(&conn, &store, &caps, "bySearch", "cat", FtsOp::Or).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.primary_key.as_str()).collect();
        assert!(ids.contains(&"d2")); // "category"
        assert!(ids.contains(&"d3")); // "cats"
    }

    #[test]
    fn empty_query_is_invalid_argument() {
        let (conn, store, caps) = setup_fallback();
        let err = search(&conn, &store, &caps, "bySearch", "   ", FtsOp::Or).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn non_fulltext_index_is_rejected() {
        let caps = Capabilities::sqlite_default();
        let store = StoreSchema::new("docs", KeyPath::single("id"))
            .with_index(IndexSchema::new("byId", KeyPath::single("id")));
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&ddl::canonical_create_table_sql(&store, &caps)).unwrap();
        let err = search(&conn, &store, &caps, "byId", "x", FtsOp::Or).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }
}
