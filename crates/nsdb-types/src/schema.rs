//! Declared schema types: [`Schema`], [`StoreSchema`], [`IndexSchema`].
//!
//! These are the caller-supplied, immutable-per-open description of what a
//! database should contain. The migration engine (in `nsdb-storage`)
//! reconciles persisted state against this description; it never mutates it.

use serde::{Deserialize, Serialize};

use crate::keypath::KeyPath;

/// The declared shape of a database: a version number and a set of stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub version: u32,
    /// If set and the persisted version is older than this, the database is
    /// wiped and recreated rather than migrated in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_usable_version: Option<u32>,
    pub stores: Vec<StoreSchema>,
}

impl Schema {
    pub fn new(version: u32, stores: Vec<StoreSchema>) -> Self {
        Schema {
            version,
            last_usable_version: None,
            stores,
        }
    }

    pub fn with_last_usable_version(mut self, v: u32) -> Self {
        self.last_usable_version = Some(v);
        self
    }

    /// Validates invariants across the whole schema: store names unique,
    /// and every store's own invariants (see [`StoreSchema::validate`]).
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = std::collections::HashSet::new();
        for store in &self.stores {
            if !seen.insert(store.name.as_str()) {
                return Err(SchemaError::DuplicateStore(store.name.clone()));
            }
            store.validate()?;
        }
        Ok(())
    }

    pub fn store(&self, name: &str) -> Option<&StoreSchema> {
        self.stores.iter().find(|s| s.name == name)
    }
}

/// The declared shape of one store: its name, primary key, and indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSchema {
    pub name: String,
    pub primary_key_path: KeyPath,
    #[serde(default)]
    pub indexes: Vec<IndexSchema>,
}

impl StoreSchema {
    pub fn new(name: impl Into<String>, primary_key_path: KeyPath) -> Self {
        StoreSchema {
            name: name.into(),
            primary_key_path,
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|i| i.name == name)
    }

    fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = std::collections::HashSet::new();
        for index in &self.indexes {
            if !seen.insert(index.name.as_str()) {
                return Err(SchemaError::DuplicateIndex {
                    store: self.name.clone(),
                    index: index.name.clone(),
                });
            }
            index.validate(&self.name)?;
        }
        Ok(())
    }
}

/// The declared shape of one secondary index on a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub key_path: KeyPath,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub multi_entry: bool,
    #[serde(default)]
    pub full_text: bool,
    #[serde(default)]
    pub include_data_in_index: bool,
}

impl IndexSchema {
    pub fn new(name: impl Into<String>, key_path: KeyPath) -> Self {
        IndexSchema {
            name: name.into(),
            key_path,
            unique: false,
            multi_entry: false,
            full_text: false,
            include_data_in_index: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn multi_entry(mut self) -> Self {
        self.multi_entry = true;
        self
    }

    pub fn full_text(mut self) -> Self {
        self.full_text = true;
        self
    }

    pub fn include_data_in_index(mut self) -> Self {
        self.include_data_in_index = true;
        self
    }

    fn validate(&self, store_name: &str) -> Result<(), SchemaError> {
        if self.multi_entry && self.key_path.is_compound() {
            return Err(SchemaError::MultiEntryCompound {
                store: store_name.to_string(),
                index: self.name.clone(),
            });
        }
        if self.full_text && self.key_path.is_compound() {
            return Err(SchemaError::FullTextCompound {
                store: store_name.to_string(),
                index: self.name.clone(),
            });
        }
        if self.full_text && self.multi_entry {
            return Err(SchemaError::FullTextMultiEntry {
                store: store_name.to_string(),
                index: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Errors raised validating a declared [`Schema`] before it is ever opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("duplicate store name {0:?}")]
    DuplicateStore(String),

    #[error("duplicate index name {index:?} in store {store:?}")]
    DuplicateIndex { store: String, index: String },

    #[error("index {index:?} on store {store:?} is multiEntry but has a compound keyPath")]
    MultiEntryCompound { store: String, index: String },

    #[error("index {index:?} on store {store:?} is fullText but has a compound keyPath")]
    FullTextCompound { store: String, index: String },

    #[error("index {index:?} on store {store:?} cannot be both fullText and multiEntry")]
    FullTextMultiEntry { store: String, index: String },
}
