//! Schema migration engine, indexed-backing variant (C5).
//!
//! Same algorithm as `sql/migration.rs`, adapted to a driver with no
//! `sqlite_master` to introspect: persisted version and per-index
//! [`IndexMetadata`] live as JSON blobs in a reserved metadata store instead
//! of a `metadata` table, and "does this index's physical structure exist"
//! means `list_indexes` rather than reading back `CREATE TABLE` text.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use nsdb_types::{IndexSchema, Schema, StoreSchema};

use crate::config::{Capabilities, ProviderConfig};
use crate::cursor::store;
use crate::driver::{CursorDriver, CursorTable};
use crate::error::{Result, StoreError};
use crate::metadata::IndexMetadata;

const METADATA_STORE: &str = "__nsdb_metadata__";
const SCHEMA_VERSION_KEY: &str = "schemaVersion";

pub fn migrate(driver: &dyn CursorDriver, schema: &Schema, caps: &Capabilities, config: &ProviderConfig) -> Result<()> {
    driver.create_store(METADATA_STORE);
    let meta = driver.primary(METADATA_STORE)?;

    let v_old = read_schema_version(driver)?;

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

    let declared_names: HashSet<&str> = schema.stores.iter().map(|s| s.name.as_str()).collect();

    if wipe {
        for name in driver.list_stores() {
            if name != METADATA_STORE {
                driver.drop_store(&name);
            }
        }
        meta.clear();
    } else {
        for name in driver.list_stores() {
            if name != METADATA_STORE && !declared_names.contains(name.as_str()) {
                info!(store = %name, "dropping store not present in declared schema");
                driver.drop_store(&name);
                delete_metadata_rows_for_store(&meta, &name);
            }
        }
    }

    for store_schema in &schema.stores {
        migrate_store(driver, &meta, store_schema, caps)?;
    }

    write_schema_version(&meta, schema.version)?;
    Ok(())
}

fn migrate_store(
    driver: &dyn CursorDriver,
    meta: &Arc<dyn CursorTable>,
    store_schema: &StoreSchema,
    caps: &Capabilities,
) -> Result<()> {
    if !driver.has_store(&store_schema.name) {
        return create_store(driver, meta, store_schema, caps);
    }
    if store_drifted(driver, meta, store_schema, caps)? {
        rebuild_store(driver, meta, store_schema, caps)
    } else {
        Ok(())
    }
}

fn store_drifted(
    driver: &dyn CursorDriver,
    meta: &Arc<dyn CursorTable>,
    store_schema: &StoreSchema,
    _caps: &Capabilities,
) -> Result<bool> {
    let existing_indexes: HashSet<String> = driver.list_indexes(&store_schema.name).into_iter().collect();
    for index in &store_schema.indexes {
        if !existing_indexes.contains(&index.name) {
            return Ok(true);
        }
        match read_index_metadata(meta, &store_schema.name, &index.name)? {
            None => return Ok(true),
            Some(m) if !m.matches(&store_schema.name, index) => return Ok(true),
            Some(_) => {}
        }
    }
    let declared: HashSet<String> = store_schema
        .indexes
        .iter()
        .map(|i| IndexMetadata::key(&store_schema.name, &i.name))
        .collect();
    for key in metadata_keys_for_store(meta, &store_schema.name) {
        if !declared.contains(&key) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn create_store(
    driver: &dyn CursorDriver,
    meta: &Arc<dyn CursorTable>,
    store_schema: &StoreSchema,
    _caps: &Capabilities,
) -> Result<()> {
    info!(store = %store_schema.name, "creating store");
    driver.create_store(&store_schema.name);
    for index in &store_schema.indexes {
        driver.create_index(&store_schema.name, &index.name);
        write_index_metadata(meta, &store_schema.name, &index.name, index)?;
    }
    Ok(())
}

fn rebuild_store(
    driver: &dyn CursorDriver,
    meta: &Arc<dyn CursorTable>,
    store_schema: &StoreSchema,
    caps: &Capabilities,
) -> Result<()> {
    info!(store = %store_schema.name, "rebuilding store: declared schema drifted");
    let primary = driver.primary(&store_schema.name)?;
    let rows = primary.range(None, None, false, false, false);
    let items: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(_, _, bytes)| serde_json::from_slice(&bytes))
        .collect::<std::result::Result<_, _>>()?;

    for index_name in driver.list_indexes(&store_schema.name) {
        driver.drop_index(&store_schema.name, &index_name);
    }
    delete_metadata_rows_for_store(meta, &store_schema.name);
    driver.drop_store(&store_schema.name);

    create_store(driver, meta, store_schema, caps)?;
    store::put_many(driver, store_schema, caps, &items)?;
    Ok(())
}

fn read_schema_version(driver: &dyn CursorDriver) -> Result<u32> {
    let meta = driver.primary(METADATA_STORE)?;
    Ok(meta
        .get(SCHEMA_VERSION_KEY, SCHEMA_VERSION_KEY)
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0))
}

fn write_schema_version(meta: &Arc<dyn CursorTable>, version: u32) -> Result<()> {
    meta.put(SCHEMA_VERSION_KEY, SCHEMA_VERSION_KEY, version.to_string().into_bytes());
    Ok(())
}

fn read_index_metadata(
    meta: &Arc<dyn CursorTable>,
    store_name: &str,
    index_name: &str,
) -> Result<Option<IndexMetadata>> {
    let key = IndexMetadata::key(store_name, index_name);
    match meta.get(&key, &key) {
        None => Ok(None),
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
    }
}

fn write_index_metadata(
    meta: &Arc<dyn CursorTable>,
    store_name: &str,
    index_name: &str,
    index: &IndexSchema,
) -> Result<()> {
    let key = IndexMetadata::key(store_name, index_name);
    let value = serde_json::to_vec(&IndexMetadata::from_schema(store_name, index))?;
    meta.put(&key, &key, value);
    Ok(())
}

fn metadata_keys_for_store(meta: &Arc<dyn CursorTable>, store_name: &str) -> Vec<String> {
    let prefix = format!("{store_name}_");
    meta.range(None, None, false, false, false)
        .into_iter()
        .filter_map(|(key, _, _)| {
            if key != SCHEMA_VERSION_KEY && key.starts_with(&prefix) {
                Some(key)
            } else {
                None
            }
        })
        .collect()
}

fn delete_metadata_rows_for_store(meta: &Arc<dyn CursorTable>, store_name: &str) {
    for key in metadata_keys_for_store(meta, store_name) {
        meta.remove_by_ref(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::memory::MemoryCursorDriver;
    use nsdb_types::{IndexSchema, KeyPath};

    #[test]
    fn creates_declared_stores_and_indexes() {
        let driver = MemoryCursorDriver::new();
        let store = StoreSchema::new("widgets", KeyPath::single("id"))
            .with_index(IndexSchema::new("byName", KeyPath::single("name")));
        let schema = Schema::new(1, vec![store]);
        migrate(&driver, &schema, &Capabilities::indexed_default(), &ProviderConfig::default()).unwrap();
        assert!(driver.has_store("widgets"));
        assert_eq!(driver.list_indexes("widgets"), vec!["byName".to_string()]);
    }

    #[test]
    fn reopening_with_same_schema_is_idempotent() {
        let driver = MemoryCursorDriver::new();
        let store = StoreSchema::new("widgets", KeyPath::single("id"))
            .with_index(IndexSchema::new("byName", KeyPath::single("name")));
        let schema = Schema::new(1, vec![store]);
        let caps = Capabilities::indexed_default();
        migrate(&driver, &schema, &caps, &ProviderConfig::default()).unwrap();
        store::put_value(
            &driver,
            schema.store("widgets").unwrap(),
            &caps,
            &serde_json::json!({"id": "w1", "name": "A"}),
        )
        .unwrap();
        migrate(&driver, &schema, &caps, &ProviderConfig::default()).unwrap();
        assert!(store::get(&driver, schema.store("widgets").unwrap(), "w1").unwrap().is_some());
    }

    #[test]
    fn index_drift_triggers_rebuild_and_preserves_data() {
        let driver = MemoryCursorDriver::new();
        let caps = Capabilities::indexed_default();
        let v1 = Schema::new(
            1,
            vec![StoreSchema::new("widgets", KeyPath::single("id"))
                .with_index(IndexSchema::new("byName", KeyPath::single("name")))],
        );
        migrate(&driver, &v1, &caps, &ProviderConfig::default()).unwrap();
        store::put_value(
            &driver,
            v1.store("widgets").unwrap(),
            &caps,
            &serde_json::json!({"id": "w1", "name": "A", "color": "red"}),
        )
        .unwrap();

        let v2 = Schema::new(
            1,
            vec![StoreSchema::new("widgets", KeyPath::single("id"))
                .with_index(IndexSchema::new("byColor", KeyPath::single("color")))],
        );
        migrate(&driver, &v2, &caps, &ProviderConfig::default()).unwrap();
        assert_eq!(driver.list_indexes("widgets"), vec!["byColor".to_string()]);
        assert!(store::get(&driver, v2.store("widgets").unwrap(), "w1").unwrap().is_some());
    }

    #[test]
    fn version_newer_than_declared_without_opt_in_fails() {
        let driver = MemoryCursorDriver::new();
        let caps = Capabilities::indexed_default();
        let v2 = Schema::new(2, vec![]);
        migrate(&driver, &v2, &caps, &ProviderConfig::default()).unwrap();
        let v1 = Schema::new(1, vec![]);
        let err = migrate(&driver, &v1, &caps, &ProviderConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::VersionTooNew { .. }));
    }
}
