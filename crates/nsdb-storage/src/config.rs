//! Provider configuration.
//!
//! Unlike `bd`'s `figment`-based layered config (env + file + CLI flags),
//! this crate has no CLI and no config file format of its own: a
//! [`ProviderConfig`] is a small struct the embedder constructs in code at
//! `open_database` time.

use std::sync::Arc;

use crate::error::StoreError;

/// Tunables passed to `Database::open`.
#[derive(Clone)]
pub struct ProviderConfig {
    /// If the persisted schema version is newer than the declared version,
    /// wipe and recreate instead of failing with `VersionTooNew`.
    pub wipe_if_existing: bool,
    /// Enables verbose `tracing` output for schema migration decisions.
    pub verbose: bool,
    /// Optional process-wide sink observing every operation-level error.
    /// Purely additive -- never swallows the original error.
    pub error_sink: Option<Arc<dyn Fn(&StoreError) + Send + Sync>>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            wipe_if_existing: false,
            verbose: false,
            error_sink: None,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("wipe_if_existing", &self.wipe_if_existing)
            .field("verbose", &self.verbose)
            .field("error_sink", &self.error_sink.is_some())
            .finish()
    }
}

impl ProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wipe_if_existing(mut self, wipe: bool) -> Self {
        self.wipe_if_existing = wipe;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn error_sink(mut self, sink: Arc<dyn Fn(&StoreError) + Send + Sync>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    pub(crate) fn notify_error(&self, err: &StoreError) {
        if let Some(sink) = &self.error_sink {
            sink(err);
        }
    }
}

/// Strips U+2028 (LINE SEPARATOR) and U+2029 (PARAGRAPH SEPARATOR) from a
/// serialized payload. Some engines choke on these in string literals; a
/// driver whose `Capabilities::requires_unicode_replacement` is set runs
/// every serialized item through this before it's written.
pub fn strip_problematic_unicode(text: &str) -> String {
    text.chars().filter(|c| *c != '\u{2028}' && *c != '\u{2029}').collect()
}

/// Capability flags describing what a driver supports, driving several
/// branch points in the migration engine and full-text search layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_native_fts: bool,
    pub supports_compound_keys: bool,
    pub requires_unicode_replacement: bool,
    pub max_variables_per_statement: usize,
}

impl Capabilities {
    /// Capabilities of the bundled SQLite driver: no native FTS3 virtual
    /// table support is assumed unless compiled in, real SQL primary keys
    /// (compound keys need no emulation), no unicode workaround needed, and
    /// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER` of 999.
    pub const fn sqlite_default() -> Self {
        Capabilities {
            supports_native_fts: false,
            supports_compound_keys: true,
            requires_unicode_replacement: false,
            max_variables_per_statement: 999,
        }
    }

    /// Capabilities matching a browser IndexedDB-style engine: no compound
    /// primary keys or multi-entry indexes without emulation, no SQL at all
    /// (so no native FTS and no statement-parameter cap).
    pub const fn indexed_default() -> Self {
        Capabilities {
            supports_native_fts: false,
            supports_compound_keys: false,
            requires_unicode_replacement: false,
            max_variables_per_statement: usize::MAX,
        }
    }
}
