//! Schema migration engine, SQL variant (C5).
//!
//! Runs once, inside the write transaction opened by `Database::open`. See
//! `SPEC_FULL.md` §4.5 for the full algorithm this implements.

use rusqlite::{Connection, params};
use tracing::{info, warn};

use nsdb_types::{IndexSchema, Schema, StoreSchema};

use crate::config::{Capabilities, ProviderConfig};
use crate::error::{Result, StoreError};
use crate::metadata::IndexMetadata;
use crate::sql::ddl::{self, canonical_create_table_sql, canonical_index_sql, is_column_based};
use crate::sql::store;

const METADATA_TABLE: &str = "metadata";
const SCHEMA_VERSION_KEY: &str = "schemaVersion";

/// Runs the full migration algorithm against an already-open transaction.
pub fn migrate(
    conn: &Connection,
    schema: &Schema,
    caps: &Capabilities,
    config: &ProviderConfig,
) -> Result<()> {
    ensure_metadata_table(conn)?;
    let v_old = read_schema_version(conn)?;

    let mut wipe = false;
    if v_old > schema.version {
        if config.wipe_if_existing {
            warn!(v_old, declared = schema.version, "declared version is older than persisted, wiping");
            wipe = true;
        } else {
            return Err(StoreError::VersionTooNew {
                persisted: v_old,
                declared: schema.version,
            });
        }
    }
    if let Some(luv) = schema.last_usable_version {
        if v_old < luv {
            warn!(v_old, last_usable_version = luv, "persisted version below lastUsableVersion, wiping");
            wipe = true;
        }
    }

    let declared_names: std::collections::HashSet<&str> =
        schema.stores.iter().map(|s| s.name.as_str()).collect();
    let valid_side_tables: std::collections::HashSet<String> = schema
        .stores
        .iter()
        .flat_map(|s| {
            s.indexes
                .iter()
                .filter(|i| !is_column_based(i, caps))
                .map(move |i| ddl::side_table_name(&s.name, &i.name))
        })
        .collect();

    if wipe {
        for (name, _) in list_tables(conn)? {
            if name != METADATA_TABLE {
                drop_table(conn, &name)?;
            }
        }
        conn.execute(
            &format!("DELETE FROM {METADATA_TABLE} WHERE name != ?1"),
            params![SCHEMA_VERSION_KEY],
        )?;
    } else {
        for (name, _) in list_tables(conn)? {
            if name == METADATA_TABLE {
                continue;
            }
            if !declared_names.contains(name.as_str()) && !valid_side_tables.contains(&name) {
                info!(table = %name, "dropping table not present in declared schema");
                drop_table(conn, &name)?;
                delete_metadata_rows_for_table(conn, &name)?;
            }
        }
    }

    for store in &schema.stores {
        migrate_store(conn, store, caps)?;
    }

    write_schema_version(conn, schema.version)?;
    Ok(())
}

fn migrate_store(conn: &Connection, store: &StoreSchema, caps: &Capabilities) -> Result<()> {
    match get_table_sql(conn, &store.name)? {
        None => create_store(conn, store, caps),
        Some(existing_sql) => {
            if store_drifted(conn, store, caps, &existing_sql)? {
                rebuild_store(conn, store, caps)
            } else {
                Ok(())
            }
        }
    }
}

fn store_drifted(
    conn: &Connection,
    store: &StoreSchema,
    caps: &Capabilities,
    existing_sql: &str,
) -> Result<bool> {
    if existing_sql != canonical_create_table_sql(store, caps) {
        return Ok(true);
    }
    for index in &store.indexes {
        let meta = read_index_metadata(conn, &store.name, &index.name)?;
        match meta {
            None => return Ok(true),
            Some(m) if !m.matches(&store.name, index) => return Ok(true),
            Some(_) => {}
        }
        if !is_column_based(index, caps) {
            if !table_exists(conn, &ddl::side_table_name(&store.name, &index.name))? {
                return Ok(true);
            }
        } else if !index_exists(conn, &format!("idx_{}_{}", store.name, index.name))? {
            return Ok(true);
        }
    }
    // Orphaned metadata rows for indexes no longer declared also count as
    // drift (resolves the open question in `SPEC_FULL.md` §4.5/§9).
    let declared: std::collections::HashSet<String> = store
        .indexes
        .iter()
        .map(|i| IndexMetadata::key(&store.name, &i.name))
        .collect();
    for key in metadata_keys_for_store(conn, &store.name)? {
        if !declared.contains(&key) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn create_store(conn: &Connection, store: &StoreSchema, caps: &Capabilities) -> Result<()> {
    info!(store = %store.name, "creating table");
    conn.execute_batch(&canonical_create_table_sql(store, caps))?;
    for stmt in canonical_index_sql(store, caps) {
        conn.execute_batch(&stmt)?;
    }
    for index in &store.indexes {
        if !is_column_based(index, caps) {
            create_side_table(conn, &store.name, index)?;
        }
        write_index_metadata(conn, &store.name, index)?;
    }
    Ok(())
}

fn rebuild_store(conn: &Connection, store: &StoreSchema, caps: &Capabilities) -> Result<()> {
    info!(store = %store.name, "rebuilding table: declared schema drifted");
    // Drop every side table that might be associated with this store,
    // whether or not it's still declared, and every SQL index on the table.
    for (name, _) in list_tables(conn)? {
        if name.starts_with(&format!("{}_", store.name)) {
            drop_table(conn, &name)?;
        }
    }
    for idx_name in list_indexes_on_table(conn, &store.name)? {
        conn.execute_batch(&format!("DROP INDEX IF EXISTS \"{idx_name}\""))?;
    }
    delete_metadata_rows_for_table(conn, &store.name)?;

    let temp_name = format!("temp_{}", store.name);
    conn.execute_batch(&format!(
        "ALTER TABLE \"{}\" RENAME TO \"{temp_name}\"",
        store.name
    ))?;

    create_store(conn, store, caps)?;

    let mut stmt = conn.prepare(&format!("SELECT {} FROM \"{temp_name}\"", ddl::DATA_COLUMN))?;
    let rows: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<_, _>>()?;
    drop(stmt);

    for raw in rows {
        let item: serde_json::Value = serde_json::from_str(&raw)?;
        store::put_value(conn, store, caps, &item)?;
    }

    conn.execute_batch(&format!("DROP TABLE \"{temp_name}\""))?;
    Ok(())
}

fn create_side_table(conn: &Connection, store_name: &str, index: &IndexSchema) -> Result<()> {
    let table = ddl::side_table_name(store_name, &index.name);
    if index.full_text {
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS \"{table}\" USING fts5(nsp_token, nsp_refpk UNINDEXED, nsp_data UNINDEXED)"
        ))?;
    } else {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (nsp_key TEXT NOT NULL, nsp_refpk TEXT NOT NULL, nsp_data TEXT)"
        ))?;
        conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{table}_key\" ON \"{table}\" (nsp_key)"
        ))?;
        conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{table}_refpk\" ON \"{table}\" (nsp_refpk)"
        ))?;
    }
    Ok(())
}

// -- metadata table helpers --------------------------------------------------

fn ensure_metadata_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {METADATA_TABLE} (name TEXT PRIMARY KEY, value TEXT NOT NULL)"
    ))?;
    Ok(())
}

fn read_schema_version(conn: &Connection) -> Result<u32> {
    conn.query_row(
        &format!("SELECT value FROM {METADATA_TABLE} WHERE name = ?1"),
        params![SCHEMA_VERSION_KEY],
        |row| row.get::<_, String>(0),
    )
    .optional_u32()
}

fn write_schema_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(
        &format!("INSERT OR REPLACE INTO {METADATA_TABLE} (name, value) VALUES (?1, ?2)"),
        params![SCHEMA_VERSION_KEY, version.to_string()],
    )?;
    Ok(())
}

fn read_index_metadata(conn: &Connection, store: &str, index: &str) -> Result<Option<IndexMetadata>> {
    let key = IndexMetadata::key(store, index);
    let value: Option<String> = conn
        .query_row(
            &format!("SELECT value FROM {METADATA_TABLE} WHERE name = ?1"),
            params![key],
            |row| row.get(0),
        )
        .optional_row()?;
    Ok(match value {
        Some(v) => Some(serde_json::from_str(&v)?),
        None => None,
    })
}

fn write_index_metadata(conn: &Connection, store: &str, index: &IndexSchema) -> Result<()> {
    let key = IndexMetadata::key(store, &index.name);
    let meta = IndexMetadata::from_schema(store, index);
    let value = serde_json::to_string(&meta)?;
    conn.execute(
        &format!("INSERT OR REPLACE INTO {METADATA_TABLE} (name, value) VALUES (?1, ?2)"),
        params![key, value],
    )?;
    Ok(())
}

fn metadata_keys_for_store(conn: &Connection, store: &str) -> Result<Vec<String>> {
    let prefix = format!("{store}_");
    let mut stmt = conn.prepare(&format!("SELECT name FROM {METADATA_TABLE} WHERE name != ?1"))?;
    let rows = stmt.query_map(params![SCHEMA_VERSION_KEY], |row| row.get::<_, String>(0))?;
    let mut keys = Vec::new();
    for row in rows {
        let name = row?;
        if let Some(rest) = name.strip_prefix(&prefix) {
            if !rest.is_empty() {
                keys.push(name.clone());
            }
        }
    }
    Ok(keys)
}

fn delete_metadata_rows_for_table(conn: &Connection, store: &str) -> Result<()> {
    for key in metadata_keys_for_store(conn, store)? {
        conn.execute(
            &format!("DELETE FROM {METADATA_TABLE} WHERE name = ?1"),
            params![key],
        )?;
    }
    Ok(())
}

// -- sqlite_master introspection --------------------------------------------

fn list_tables(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT name, sql FROM sqlite_master WHERE type IN ('table','view') AND name NOT LIKE 'sqlite_%'",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn get_table_sql(conn: &Connection, name: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type='table' AND name = ?1",
        params![name],
        |row| row.get::<_, String>(0),
    )
    .optional_row()
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(get_table_sql(conn, name)?.is_some())
}

fn index_exists(conn: &Connection, name: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type='index' AND name = ?1",
        params![name],
        |row| row.get::<_, i32>(0),
    )
    .optional_row()
    .map(|v| v.is_some())
}

fn list_indexes_on_table(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='index' AND tbl_name = ?1 AND name NOT LIKE 'sqlite_%'",
    )?;
    let rows = stmt.query_map(params![table], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn drop_table(conn: &Connection, name: &str) -> Result<()> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{name}\""))?;
    Ok(())
}

/// Small helper trait converting a `rusqlite` single-row lookup into an
/// `Option`, treating `QueryReturnedNoRows` as `None` rather than an error.
trait OptionalRow<T> {
    fn optional_row(self) -> Result<Option<T>>;
    fn optional_u32(self) -> Result<u32>
    where
        Self: Sized,
        T: AsRef<str>,
    {
        Ok(self
            .optional_row()?
            .and_then(|v| v.as_ref().parse::<u32>().ok())
            .unwrap_or(0))
    }
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
