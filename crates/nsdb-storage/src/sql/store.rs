//! Store runtime, SQL variant (C6): `get`, `put`, `remove`, `clearAllData`.
//!
//! Column-based indexes are denormalized onto the base table (`nsp_i_<name>`
//! columns written alongside every row); multi-entry and (non-native-FTS)
//! full-text indexes live in side tables keyed by the row's primary key
//! (`nsp_refpk`). Index *reads* always join back to the base table for the
//! item payload rather than duplicating it in the side table -- see
//! `sql/index.rs`.

use rusqlite::{Connection, ToSql, params_from_iter};
use serde_json::Value;
use tracing::trace;

use nsdb_types::{IndexSchema, StoreSchema};

use crate::config::Capabilities;
use crate::error::{Result, StoreError};
use crate::sql::ddl::{self, is_column_based};
use crate::sql::fts::FTS_SENTINEL;

/// The column value for a column-based index: the serialized key for a
/// plain index, or a sentinel-delimited token list for a fallback
/// (non-native) full-text index -- see `sql/fts.rs`.
fn column_value(item: &Value, index: &IndexSchema) -> Option<String> {
    if index.full_text {
        let text = index.key_path.extract(item).into_iter().next().flatten()?.as_str()?.to_string();
        let tokens = nsdb_types::tokenize(&text);
        if tokens.is_empty() {
            return None;
        }
        Some(format!("{FTS_SENTINEL}{}{FTS_SENTINEL}", tokens.join(FTS_SENTINEL)))
    } else {
        index.key_path.extract_and_serialize(item).ok()
    }
}

/// Looks up one item by primary key, returning its raw JSON text.
pub fn get(conn: &Connection, store: &StoreSchema, pk: &str) -> Result<Option<String>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM \"{}\" WHERE {} = ?1",
            ddl::DATA_COLUMN, store.name, ddl::PK_COLUMN
        ),
        [pk],
        |row| row.get::<_, String>(0),
    )
    .optional_row()
}

/// Looks up several items by primary key in one round trip, preserving the
/// request order and returning `None` for keys with no match.
pub fn get_multiple(conn: &Connection, store: &StoreSchema, pks: &[String]) -> Result<Vec<Option<String>>> {
    if pks.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = (1..=pks.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
    let sql = format!(
        "SELECT {}, {} FROM \"{}\" WHERE {} IN ({placeholders})",
        ddl::PK_COLUMN, ddl::DATA_COLUMN, store.name, ddl::PK_COLUMN
    );
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn ToSql> = pks.iter().map(|p| p as &dyn ToSql).collect();
    let rows = stmt.query_map(params_from_iter(params), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut found = std::collections::HashMap::new();
    for row in rows {
        let (pk, data) = row?;
        found.insert(pk, data);
    }
    Ok(pks.iter().map(|pk| found.get(pk).cloned()).collect())
}

/// Inserts or replaces a single item, including its index projections. Used
/// both by the public `put` entry point and by the migration rebuild path.
pub fn put_value(conn: &Connection, store: &StoreSchema, caps: &Capabilities, item: &Value) -> Result<()> {
    put_many(conn, store, caps, std::slice::from_ref(item))
}

/// Inserts or replaces many items in one call, batching the base-table
/// upsert so no single statement exceeds `caps.max_variables_per_statement`.
pub fn put_many(conn: &Connection, store: &StoreSchema, caps: &Capabilities, items: &[Value]) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }

    let column_indexes: Vec<&IndexSchema> = store
        .indexes
        .iter()
        .filter(|i| is_column_based(i, caps))
        .collect();
    let side_indexes: Vec<&IndexSchema> = store
        .indexes
        .iter()
        .filter(|i| !is_column_based(i, caps))
        .collect();

    let columns_per_row = 2 + column_indexes.len();
    let batch_size = (caps.max_variables_per_statement / columns_per_row).max(1);

    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let pk = store.primary_key_path.extract_and_serialize(item)?;
        let mut data = serde_json::to_string(item)?;
        if caps.requires_unicode_replacement {
            data = crate::config::strip_problematic_unicode(&data);
        }
        let mut index_values = Vec::with_capacity(column_indexes.len());
        for index in &column_indexes {
            index_values.push(column_value(item, index));
        }
        rows.push((pk, data, index_values));
    }

    for chunk in rows.chunks(batch_size) {
        let mut columns = vec![ddl::PK_COLUMN.to_string(), ddl::DATA_COLUMN.to_string()];
        for index in &column_indexes {
            columns.push(ddl::index_column(&index.name));
        }
        let placeholders_per_row = format!("({})", vec!["?"; columns.len()].join(", "));
        let values_sql = vec![placeholders_per_row; chunk.len()].join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO \"{}\" ({}) VALUES {values_sql}",
            store.name,
            columns
                .iter()
                .map(|c| format!("\"{c}\""))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut bound: Vec<Box<dyn ToSql>> = Vec::new();
        for (pk, data, index_values) in chunk {
            bound.push(Box::new(pk.clone()));
            bound.push(Box::new(data.clone()));
            for v in index_values {
                bound.push(Box::new(v.clone()));
            }
        }
        let params: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();
        conn.execute(&sql, params_from_iter(params))?;
        trace!(store = %store.name, rows = chunk.len(), "upserted batch");
    }

    for index in &side_indexes {
        for (pk, _data, _) in &rows {
            repopulate_side_table(conn, store, index, pk, items)?;
        }
    }

    Ok(())
}

/// Deletes and reinserts one item's rows in `index`'s side table. Cheap
/// enough to call per item; multi-entry fan-out is normally small.
fn repopulate_side_table(
    conn: &Connection,
    store: &StoreSchema,
    index: &IndexSchema,
    pk: &str,
    items: &[Value],
) -> Result<()> {
    let item = items
        .iter()
        .find(|i| store.primary_key_path.extract_and_serialize(i).ok().as_deref() == Some(pk))
        .ok_or_else(|| StoreError::Internal("item vanished during side-table repopulation".into()))?;

    let table = ddl::side_table_name(&store.name, &index.name);
    if index.full_text {
        conn.execute(
            &format!("DELETE FROM \"{table}\" WHERE nsp_refpk = ?1"),
            [pk],
        )?;
        if let Some(Some(value)) = index.key_path.extract(item).into_iter().next() {
            if let Some(text) = value.as_str() {
                for token in nsdb_types::tokenize(text) {
                    conn.execute(
                        &format!("INSERT INTO \"{table}\" (nsp_token, nsp_refpk, nsp_data) VALUES (?1, ?2, ?3)"),
                        rusqlite::params![token, pk, text],
                    )?;
                }
            }
        }
    } else {
        conn.execute(
            &format!("DELETE FROM \"{table}\" WHERE nsp_refpk = ?1"),
            [pk],
        )?;
        if index.multi_entry {
            if let Some(Some(entries)) = index.key_path.extract(item).into_iter().next() {
                if let Ok(values) = index.key_path.list_of_keys(entries) {
                    for key in values {
                        conn.execute(
                            &format!("INSERT INTO \"{table}\" (nsp_key, nsp_refpk, nsp_data) VALUES (?1, ?2, NULL)"),
                            rusqlite::params![key, pk],
                        )?;
                    }
                }
            }
        } else if let Ok(key) = index.key_path.extract_and_serialize(item) {
            conn.execute(
                &format!("INSERT INTO \"{table}\" (nsp_key, nsp_refpk, nsp_data) VALUES (?1, ?2, NULL)"),
                rusqlite::params![key, pk],
            )?;
        }
    }
    Ok(())
}

/// Removes one item and any side-table rows referencing it.
pub fn remove(conn: &Connection, store: &StoreSchema, caps: &Capabilities, pk: &str) -> Result<()> {
    for index in store.indexes.iter().filter(|i| !is_column_based(i, caps)) {
        let table = ddl::side_table_name(&store.name, &index.name);
        conn.execute(&format!("DELETE FROM \"{table}\" WHERE nsp_refpk = ?1"), [pk])?;
    }
    conn.execute(
        &format!("DELETE FROM \"{}\" WHERE {} = ?1", store.name, ddl::PK_COLUMN),
        [pk],
    )?;
    Ok(())
}

/// Empties a store, including every index's side table.
pub fn clear_all_data(conn: &Connection, store: &StoreSchema, caps: &Capabilities) -> Result<()> {
    for index in store.indexes.iter().filter(|i| !is_column_based(i, caps)) {
        let table = ddl::side_table_name(&store.name, &index.name);
        conn.execute_batch(&format!("DELETE FROM \"{table}\""))?;
    }
    conn.execute_batch(&format!("DELETE FROM \"{}\"", store.name))?;
    Ok(())
}

trait OptionalRow<T> {
    fn optional_row(self) -> Result<Option<T>>;
}

impl<T> OptionalRow<T> for std::result::Result<T, rusqlite::Error> {
    fn optional_row(self) -> Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
