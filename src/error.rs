//! Error types for Vellum
//!
//! Provides a unified error type for all operations.
//!
//! Absence of a value is never an error: `get` on a missing key returns
//! `Ok(None)`, `delete` on a missing key returns `Ok(())`, and a cursor past
//! its last entry yields `None`. The variants below are real faults.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using Error
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Vellum operations
#[derive(Debug, Error)]
pub enum Error {
    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    /// No store exists at the path and `create_if_missing` was disabled
    #[error("no store found at {path:?} (create_if_missing is disabled)")]
    NotFound { path: PathBuf },

    /// A store already exists at the path and `error_if_exists` was enabled
    #[error("store already exists at {path:?} (error_if_exists is enabled)")]
    AlreadyExists { path: PathBuf },

    /// Operation attempted on a closed handle or snapshot
    #[error("{0} is closed")]
    Closed(&'static str),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    /// Checksum or framing failure in the log, or an unrecoverable repair
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// Any other engine failure (lock conflict, invalid state)
    #[error("storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error means the store's on-disk state is damaged.
    ///
    /// Callers seeing `true` should try [`repair`](crate::repair) before
    /// giving up on the store.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
