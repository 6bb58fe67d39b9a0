//! Store error types.

use nsdb_types::{KeyPathError, SchemaError};

/// Errors that can occur opening a database or operating on a store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A caller-supplied argument was invalid (empty search phrase, a
    /// resolution mode that doesn't apply, a schema invariant violation).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A key could not be extracted from an item or serialized.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyPathError),

    /// The declared schema itself is invalid.
    #[error("invalid schema: {0}")]
    InvalidSchema(#[from] SchemaError),

    /// The named store is not in the declared schema.
    #[error("store not found: {0}")]
    StoreNotFound(String),

    /// The named index is not in the declared schema for its store.
    #[error("index {index} not found on store {store}")]
    IndexNotFound { store: String, index: String },

    /// An operation was attempted on a transaction that already completed
    /// or aborted.
    #[error("transaction is already closed")]
    TransactionClosed,

    /// The transaction was aborted, explicitly or by the backend.
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    /// The database has already been closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// The database is draining in-flight transactions and refusing new
    /// ones.
    #[error("database is closing")]
    DatabaseClosing,

    /// The persisted schema version is newer than the declared version and
    /// the caller did not opt in to wiping the database.
    #[error("persisted schema version {persisted} is newer than declared version {declared}")]
    VersionTooNew { persisted: u32, declared: u32 },

    /// The required storage backend is unavailable in this environment.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// An unclassified error surfaced by the underlying driver.
    #[error("backend error: {0}")]
    BackendError(#[from] rusqlite::Error),

    /// JSON serialization or deserialization of an item failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn store_not_found(name: impl Into<String>) -> Self {
        Self::StoreNotFound(name.into())
    }

    pub fn index_not_found(store: impl Into<String>, index: impl Into<String>) -> Self {
        Self::IndexNotFound {
            store: store.into(),
            index: index.into(),
        }
    }

    /// `true` if this is a [`StoreError::StoreNotFound`] or
    /// [`StoreError::IndexNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::StoreNotFound(_) | Self::IndexNotFound { .. })
    }

    /// `true` if the error is transient and the operation may succeed on
    /// retry (lock contention surfaced through the backend).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendError(e) if matches!(
            e.sqlite_error_code(),
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
        ))
    }
}
