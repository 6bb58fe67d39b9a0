//! Index view operations, indexed-backing variant (C6).

use nsdb_types::StoreSchema;

use crate::driver::CursorDriver;
use crate::error::{Result, StoreError};
use crate::range::RangeBounds;

pub struct IndexRow {
    pub key: String,
    pub primary_key: String,
    pub data: String,
}

pub fn range(
    driver: &dyn CursorDriver,
    store: &StoreSchema,
    index_name: &str,
    bounds: &RangeBounds,
    reverse: bool,
    offset: usize,
    limit: Option<usize>,
) -> Result<Vec<IndexRow>> {
    store
        .index(index_name)
        .ok_or_else(|| StoreError::index_not_found(&store.name, index_name))?;
    let table = driver.index(&store.name, index_name)?;
    let primary = driver.primary(&store.name)?;

    let rows = table.range(
        bounds.lower.as_deref(),
        bounds.upper.as_deref(),
        bounds.lower_exclusive,
        bounds.upper_exclusive,
        reverse,
    );

    let mut out = Vec::new();
    for (i, (key, refk, _)) in rows.into_iter().enumerate() {
        if i < offset {
            continue;
        }
        if let Some(limit) = limit {
            if out.len() >= limit {
                break;
            }
        }
        if let Some(data) = primary.get(&refk, &refk) {
            out.push(IndexRow {
                key,
                primary_key: refk,
                data: String::from_utf8(data)
                    .map_err(|e| StoreError::Internal(format!("stored item is not valid utf-8: {e}")))?,
            });
        }
    }
    Ok(out)
}

/// Scans the primary table directly, without going through a secondary
/// index (`openPrimaryKey()`'s view). `key` and `primary_key` are identical
/// for every returned row.
pub fn range_primary(
    driver: &dyn CursorDriver,
    store: &StoreSchema,
    bounds: &RangeBounds,
    reverse: bool,
    offset: usize,
    limit: Option<usize>,
) -> Result<Vec<IndexRow>> {
    let primary = driver.primary(&store.name)?;
    let rows = primary.range(
        bounds.lower.as_deref(),
        bounds.upper.as_deref(),
        bounds.lower_exclusive,
        bounds.upper_exclusive,
        reverse,
    );

    let mut out = Vec::new();
    for (i, (key, refk, value)) in rows.into_iter().enumerate() {
        if i < offset {
            continue;
        }
        if let Some(limit) = limit {
            if out.len() >= limit {
                break;
            }
        }
        out.push(IndexRow {
            key,
            primary_key: refk,
            data: String::from_utf8(value)
                .map_err(|e| StoreError::Internal(format!("stored item is not valid utf-8: {e}")))?,
        });
    }
    Ok(out)
}

/// Counts rows in the primary-key range directly, mirroring `range_primary`.
pub fn count_primary(driver: &dyn CursorDriver, store: &StoreSchema, bounds: &RangeBounds) -> Result<u64> {
    let primary = driver.primary(&store.name)?;
    Ok(primary.count(
        bounds.lower.as_deref(),
        bounds.upper.as_deref(),
        bounds.lower_exclusive,
        bounds.upper_exclusive,
    ) as u64)
}

pub fn count(driver: &dyn CursorDriver, store: &StoreSchema, index_name: &str, bounds: &RangeBounds) -> Result<u64> {
    store
        .index(index_name)
        .ok_or_else(|| StoreError::index_not_found(&store.name, index_name))?;
    let table = driver.index(&store.name, index_name)?;
    Ok(table.count(
        bounds.lower.as_deref(),
        bounds.upper.as_deref(),
        bounds.lower_exclusive,
        bounds.upper_exclusive,
    ) as u64)
}
