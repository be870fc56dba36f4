//! # Vellum
//!
//! An embedded, ordered key-value store with:
//! - Write-Ahead Logging (WAL) for durability and crash recovery
//! - Atomic multi-key write batches
//! - Point-in-time snapshots isolated from later writes
//! - Bidirectional, bounded cursors with push and pull enumeration
//!
//! Keys and values are arbitrary byte strings, ordered lexicographically
//! over raw bytes. Absence is never an error: a missing key reads as
//! `None`, deleting it succeeds silently, and an exhausted cursor yields
//! `None`.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Database Handle                         │
//! │          (lifecycle, one live handle per path)              │
//! └──────┬──────────────┬──────────────┬───────────────┬───────┘
//!        │              │              │               │
//!        ▼              ▼              ▼               ▼
//! ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐
//! │ get / put  │ │ WriteBatch │ │  Snapshot  │ │   Cursor   │
//! │   delete   │ │  (atomic)  │ │  (frozen)  │ │  (ranged)  │
//! └──────┬─────┘ └──────┬─────┘ └──────┬─────┘ └──────┬─────┘
//!        │              │              │               │
//! ┌──────▼──────────────▼──────────────▼───────────────▼───────┐
//! │                      Ordered Store                          │
//! │              (RwLock'd ordered map + WAL)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use vellum::{Database, OpenOptions, ScanOptions};
//!
//! let db = Database::open("/tmp/quickstart", &OpenOptions::default())?;
//!
//! db.put("three", "3")?;
//! db.batch(|b| {
//!     b.put("one", "1");
//!     b.put("two", "2");
//!     Ok(())
//! })?;
//!
//! // Keys come back in byte order: one, three, two
//! for (key, value) in db.iter(ScanOptions::new())? {
//!     println!("{:?} = {:?}", key, value);
//! }
//!
//! db.close()?;
//! # Ok::<(), vellum::Error>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod batch;
pub mod cursor;
pub mod db;
pub mod snapshot;
pub mod store;
pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use batch::WriteBatch;
pub use config::{OpenOptions, ScanOptions, SyncStrategy};
pub use cursor::Cursor;
pub use db::{destroy, repair, Database};
pub use error::{Error, Result};
pub use snapshot::Snapshot;
pub use wal::RecoveryReport;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Vellum
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
