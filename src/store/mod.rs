//! Ordered Store Module
//!
//! The persistent ordered map underneath [`Database`](crate::Database).
//!
//! ## Responsibilities
//! - Own the in-memory ordered map and its write-ahead log
//! - Replay the log on open to rebuild state
//! - Serve point reads, atomic commits, and frozen views
//! - Compact the log when it outgrows its threshold

mod engine;

pub use engine::OrderedStore;

/// Log file name inside a store directory; its presence is what defines
/// "a store exists here"
pub const WAL_FILENAME: &str = "wal.log";

/// Advisory marker left in the directory while a store is open
pub const LOCK_FILENAME: &str = "LOCK";
