//! Store runtime, indexed-backing variant (C6).
//!
//! The primary table and every index table share one shape
//! (`CursorTable`), so a primary row is really just a row keyed
//! `(primaryKey, primaryKey)` -- `remove_by_ref` on that table deletes it the
//! same way it deletes any other index's rows for that key.

use serde_json::Value;

use nsdb_types::IndexSchema;
use nsdb_types::StoreSchema;

use crate::config::Capabilities;
use crate::driver::CursorDriver;
use crate::error::{Result, StoreError};

pub fn get(driver: &dyn CursorDriver, store: &StoreSchema, pk: &str) -> Result<Option<String>> {
    let primary = driver.primary(&store.name)?;
    match primary.get(pk, pk) {
        Some(bytes) => Ok(Some(String::from_utf8(bytes).map_err(|e| {
            StoreError::Internal(format!("stored item is not valid utf-8: {e}"))
        })?)),
        None => Ok(None),
    }
}

pub fn get_multiple(driver: &dyn CursorDriver, store: &StoreSchema, pks: &[String]) -> Result<Vec<Option<String>>> {
    pks.iter().map(|pk| get(driver, store, pk)).collect()
}

pub fn put_value(driver: &dyn CursorDriver, store: &StoreSchema, caps: &Capabilities, item: &Value) -> Result<()> {
    put_many(driver, store, caps, std::slice::from_ref(item))
}

pub fn put_many(driver: &dyn CursorDriver, store: &StoreSchema, caps: &Capabilities, items: &[Value]) -> Result<()> {
    let primary = driver.primary(&store.name)?;
    for item in items {
        // Compound primary keys are serialized through the same ordered
        // string codec regardless of `supports_compound_keys`, emulating a
        // `nsp_pk`-style synthetic key the way an engine without native
        // compound-key support would.
        let pk = store.primary_key_path.extract_and_serialize(item)?;
        let mut data = serde_json::to_string(item)?;
        if caps.requires_unicode_replacement {
            data = crate::config::strip_problematic_unicode(&data);
        }
        primary.put(&pk, &pk, data.into_bytes());
        for index in &store.indexes {
            repopulate_index(driver, store, index, &pk, item)?;
        }
    }
    Ok(())
}

fn repopulate_index(
    driver: &dyn CursorDriver,
    store: &StoreSchema,
    index: &IndexSchema,
    pk: &str,
    item: &Value,
) -> Result<()> {
    let table = driver.index(&store.name, &index.name)?;
    table.remove_by_ref(pk);

    if index.full_text {
        if let Some(Some(value)) = index.key_path.extract(item).into_iter().next() {
            if let Some(text) = value.as_str() {
                for token in nsdb_types::tokenize(text) {
                    table.put(&token, pk, text.as_bytes().to_vec());
                }
            }
        }
    } else if index.multi_entry {
        if let Some(Some(entries)) = index.key_path.extract(item).into_iter().next() {
            if let Ok(keys) = index.key_path.list_of_keys(entries) {
                for key in keys {
                    table.put(&key, pk, Vec::new());
                }
            }
        }
    } else if let Ok(key) = index.key_path.extract_and_serialize(item) {
        table.put(&key, pk, Vec::new());
    }
    Ok(())
}

pub fn remove(driver: &dyn CursorDriver, store: &StoreSchema, pk: &str) -> Result<()> {
    driver.primary(&store.name)?.remove_by_ref(pk);
    for index in &store.indexes {
        driver.index(&store.name, &index.name)?.remove_by_ref(pk);
    }
    Ok(())
}

pub fn clear_all_data(driver: &dyn CursorDriver, store: &StoreSchema) -> Result<()> {
    driver.primary(&store.name)?.clear();
    for index in &store.indexes {
        driver.index(&store.name, &index.name)?.clear();
    }
    Ok(())
}
