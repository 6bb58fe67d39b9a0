//! Index view operations, SQL variant (C6): `getAll`, `getOnly`, `getRange`,
//! and their `count*` counterparts.
//!
//! Every read joins back to the base table for the item payload rather than
//! trusting a copy held in a side table, so a side table never needs its own
//! `nsp_data` kept in sync -- see `sql/store.rs`.

use rusqlite::{Connection, ToSql, params_from_iter};

use nsdb_types::{IndexSchema, StoreSchema};

use crate::config::Capabilities;
use crate::error::{Result, StoreError};
use crate::range::RangeBounds;
use crate::sql::ddl::{self, is_column_based};

/// Materialized row from an index range scan: the index key, the referenced
/// primary key, and the item's raw JSON text.
pub struct IndexRow {
    pub key: String,
    pub primary_key: String,
    pub data: String,
}

fn find_index<'a>(store: &'a StoreSchema, index_name: &str) -> Result<&'a IndexSchema> {
    store.index(index_name).ok_or_else(|| StoreError::IndexNotFound {
        store: store.name.clone(),
        index: index_name.to_string(),
    })
}

/// Scans an index's key range, returning up to `limit` rows (after skipping
/// `offset`), in ascending order unless `reverse` is set.
#[allow(clippy::too_many_arguments)]
pub fn range(
    conn: &Connection,
    store: &StoreSchema,
    caps: &Capabilities,
    index_name: &str,
    bounds: &RangeBounds,
    reverse: bool,
    offset: usize,
    limit: Option<usize>,
) -> Result<Vec<IndexRow>> {
    let index = find_index(store, index_name)?;
    let order = if reverse { "DESC" } else { "ASC" };

    let (where_sql, params) = bounds_clause(bounds);

    let sql = if is_column_based(index, caps) {
        let col = ddl::index_column(&index.name);
        format!(
            "SELECT \"{col}\", \"{}\", \"{}\" FROM \"{}\" WHERE \"{col}\" IS NOT NULL{} ORDER BY \"{col}\" {order}",
            ddl::PK_COLUMN,
            ddl::DATA_COLUMN,
            store.name,
            prefix_and(&where_sql, &col),
        )
    } else {
        let table = ddl::side_table_name(&store.name, &index.name);
        format!(
            "SELECT s.nsp_key, s.nsp_refpk, b.\"{}\" FROM \"{table}\" s \
             JOIN \"{}\" b ON s.nsp_refpk = b.\"{}\" WHERE 1=1{} ORDER BY s.nsp_key {order}",
            ddl::DATA_COLUMN,
            store.name,
            ddl::PK_COLUMN,
            prefix_and(&where_sql, "s.nsp_key"),
        )
    };

    let mut stmt = conn.prepare(&sql)?;
    let bound: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
    let rows = stmt.query_map(params_from_iter(bound), |row| {
        Ok(IndexRow {
            key: row.get(0)?,
            primary_key: row.get(1)?,
            data: row.get(2)?,
        })
    })?;

    let mut out = Vec::new();
    for (i, row) in rows.enumerate() {
        if i < offset {
            row?;
            continue;
        }
        if let Some(limit) = limit {
            if out.len() >= limit {
                break;
            }
        }
        out.push(row?);
    }
    Ok(out)
}

/// Scans the base table's primary-key range directly, without going through
/// a secondary index (`openPrimaryKey()`'s view). `key` and `primary_key`
/// are identical for every returned row.
pub fn range_primary(
    conn: &Connection,
    store: &StoreSchema,
    bounds: &RangeBounds,
    reverse: bool,
    offset: usize,
    limit: Option<usize>,
) -> Result<Vec<IndexRow>> {
    let order = if reverse { "DESC" } else { "ASC" };
    let (where_sql, params) = bounds_clause(bounds);
    let sql = format!(
        "SELECT \"{pk}\", \"{pk}\", \"{data}\" FROM \"{table}\" WHERE 1=1{clause} ORDER BY \"{pk}\" {order}",
        pk = ddl::PK_COLUMN,
        data = ddl::DATA_COLUMN,
        table = store.name,
        clause = prefix_and(&where_sql, ddl::PK_COLUMN),
    );

    let mut stmt = conn.prepare(&sql)?;
    let bound: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
    let rows = stmt.query_map(params_from_iter(bound), |row| {
        Ok(IndexRow {
            key: row.get(0)?,
            primary_key: row.get(1)?,
            data: row.get(2)?,
        })
    })?;

    let mut out = Vec::new();
    for (i, row) in rows.enumerate() {
        if i < offset {
            row?;
            continue;
        }
        if let Some(limit) = limit {
            if out.len() >= limit {
                break;
            }
        }
        out.push(row?);
    }
    Ok(out)
}

/// Counts rows in the primary-key range directly, mirroring `range_primary`.
pub fn count_primary(conn: &Connection, store: &StoreSchema, bounds: &RangeBounds) -> Result<u64> {
    let (where_sql, params) = bounds_clause(bounds);
    let sql = format!(
        "SELECT COUNT(*) FROM \"{}\" WHERE 1=1{}",
        store.name,
        prefix_and(&where_sql, ddl::PK_COLUMN),
    );
    let bound: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
    let n: i64 = conn.query_row(&sql, params_from_iter(bound), |row| row.get(0))?;
    Ok(n as u64)
}

/// Counts matching rows without materializing them.
pub fn count(
    conn: &Connection,
    store: &StoreSchema,
    caps: &Capabilities,
    index_name: &str,
    bounds: &RangeBounds,
) -> Result<u64> {
    let index = find_index(store, index_name)?;
    let (where_sql, params) = bounds_clause(bounds);

    let sql = if is_column_based(index, caps) {
        let col = ddl::index_column(&index.name);
        format!(
            "SELECT COUNT(*) FROM \"{}\" WHERE \"{col}\" IS NOT NULL{}",
            store.name,
            prefix_and(&where_sql, &col),
        )
    } else {
        let table = ddl::side_table_name(&store.name, &index.name);
        format!("SELECT COUNT(*) FROM \"{table}\" s WHERE 1=1{}", prefix_and(&where_sql, "s.nsp_key"))
    };

    let bound: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
    let n: i64 = conn.query_row(&sql, params_from_iter(bound), |row| row.get(0))?;
    Ok(n as u64)
}

/// Builds the bound-dependent fragment of the WHERE clause (without the
/// leading `AND`/keyword) plus its bind values, against a caller-supplied
/// column expression substituted in by the caller.
fn bounds_clause(bounds: &RangeBounds) -> (Vec<String>, Vec<String>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    if let Some(lower) = &bounds.lower {
        clauses.push(if bounds.lower_exclusive { ">" } else { ">=" }.to_string());
        params.push(lower.clone());
    }
    if let Some(upper) = &bounds.upper {
        clauses.push(if bounds.upper_exclusive { "<" } else { "<=" }.to_string());
        params.push(upper.clone());
    }
    (clauses, params)
}

fn prefix_and(ops: &[String], column: &str) -> String {
    ops.iter()
        .map(|op| format!(" AND {column} {op} ?"))
        .collect::<Vec<_>>()
        .join("")
}
