//! Configuration for Vellum
//!
//! Typed option structs with documented defaults. Both structs are small and
//! passed by value, so the chainable setters live directly on them rather
//! than on a separate builder type.

use bytes::Bytes;

// =============================================================================
// Open Options
// =============================================================================

/// Options controlling [`Database::open`](crate::Database::open)
#[derive(Debug, Clone)]
pub struct OpenOptions {
    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    /// Create a new store at the path if none exists (default: true)
    pub create_if_missing: bool,

    /// Fail with `AlreadyExists` if a store already exists (default: false)
    pub error_if_exists: bool,

    // -------------------------------------------------------------------------
    // Engine
    // -------------------------------------------------------------------------
    /// How often the log is fsynced (default: every commit)
    pub sync_strategy: SyncStrategy,

    /// Rewrite the log once it exceeds this many bytes (default: 4 MiB)
    pub compact_threshold: u64,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            sync_strategy: SyncStrategy::EveryCommit,
            compact_threshold: 4 * 1024 * 1024,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether a missing store is created
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Set whether an existing store is an error
    pub fn error_if_exists(mut self, error: bool) -> Self {
        self.error_if_exists = error;
        self
    }

    /// Set the log sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.sync_strategy = strategy;
        self
    }

    /// Set the log compaction threshold (in bytes)
    pub fn compact_threshold(mut self, bytes: u64) -> Self {
        self.compact_threshold = bytes;
        self
    }
}

/// Log sync strategy
#[derive(Debug, Clone, Copy)]
pub enum SyncStrategy {
    /// fsync after every commit (safest, slowest)
    EveryCommit,

    /// fsync after N unsynced commits (balanced durability/performance)
    EveryNCommits { count: usize },
}

// =============================================================================
// Scan Options
// =============================================================================

/// Options controlling a cursor created by
/// [`Database::iter`](crate::Database::iter) or
/// [`Snapshot::iter`](crate::Snapshot::iter)
///
/// All fields are optional and composable. Bounds are inclusive and need not
/// name keys that exist; positioning uses nearest-neighbor semantics (the
/// smallest key at or above `from`, the largest at or below `to`).
///
/// An empty range (`from` > `to`) yields no entries; it is not an error.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Inclusive lower bound; `None` starts at the first key
    pub from: Option<Bytes>,

    /// Inclusive upper bound; `None` runs to the last key
    pub to: Option<Bytes>,

    /// Maximum number of entries yielded; `None` is unlimited
    pub limit: Option<usize>,

    /// Traverse in descending key order (default: false)
    pub reverse: bool,
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inclusive lower bound
    pub fn from(mut self, key: impl AsRef<[u8]>) -> Self {
        self.from = Some(Bytes::copy_from_slice(key.as_ref()));
        self
    }

    /// Set the inclusive upper bound
    pub fn to(mut self, key: impl AsRef<[u8]>) -> Self {
        self.to = Some(Bytes::copy_from_slice(key.as_ref()));
        self
    }

    /// Set the maximum number of entries yielded
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the traversal direction
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}
