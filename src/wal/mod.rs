//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging. Every commit
//! is written to the log as a single framed record before it is applied to
//! the in-memory map, so a batch either survives a crash in full or not at
//! all.
//!
//! ## Responsibilities
//! - Append one record per commit before any mutation is applied
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering
//! - Crash recovery and replay
//! - Compaction: rewriting the log from the live state alone
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2                                │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//!
//! `Data` is the bincode encoding of the record's mutation list. The CRC
//! covers the LSN and the data, so a frame whose header and payload are both
//! present but damaged is distinguishable from a frame cut short by a crash.

mod reader;
mod record;
mod recovery;
mod writer;

pub use reader::{NextRecord, WalReader};
pub use record::{Mutation, Record, HEADER_SIZE, MAX_PAYLOAD_LEN};
pub use recovery::{RecoveryReport, WalRecovery};
pub use writer::WalWriter;
