//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.
//!
//! Two modes are provided:
//! - [`WalRecovery::recover`] is the normal-open path. A torn record at the
//!   tail (left incomplete or unverifiable by a crash mid-append) is
//!   dropped; a bad frame with readable data after it is reported as
//!   corruption and the caller decides what to do.
//! - [`WalRecovery::salvage`] is the repair path. It keeps the longest valid
//!   prefix of the log and drops everything from the first bad frame onward.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::{Error, Result};

use super::reader::{NextRecord, WalReader};
use super::record::Record;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    /// Number of commit records successfully recovered
    pub records_recovered: u64,

    /// Bytes dropped from the tail of the log
    pub bytes_dropped: u64,

    /// Last valid LSN (0 if the log held no records)
    pub last_lsn: u64,

    /// Whether the tail of the WAL was dropped (partial or damaged frames)
    pub truncated: bool,
}

impl WalRecovery {
    /// Recover records from a WAL file
    ///
    /// This will:
    /// 1. Read all records in order, verifying each frame's CRC
    /// 2. Drop a torn record at the tail (the final frame being incomplete
    ///    or failing verification)
    /// 3. Fail with [`Error::Corruption`] on damage followed by more data
    ///
    /// The returned report carries the byte offset bookkeeping the caller
    /// needs to truncate the file back to its valid prefix.
    pub fn recover(path: &Path) -> Result<(Vec<Record>, RecoveryReport)> {
        Self::scan(path, false)
    }

    /// Salvage the longest valid prefix of a WAL file
    ///
    /// Unlike [`recover`](Self::recover), a frame that fails verification does
    /// not abort the scan. Everything from the first bad frame to the end of
    /// the file is treated as lost and the valid records before it are
    /// returned. I/O errors from the underlying file still propagate.
    pub fn salvage(path: &Path) -> Result<(Vec<Record>, RecoveryReport)> {
        Self::scan(path, true)
    }

    fn scan(path: &Path, salvage: bool) -> Result<(Vec<Record>, RecoveryReport)> {
        let file_len = fs::metadata(path)?.len();
        let mut reader = WalReader::open(path)?;

        let mut records: Vec<Record> = Vec::new();
        let mut last_lsn = 0u64;
        let mut truncated = false;
        let mut bytes_dropped = 0u64;

        loop {
            // Offset of the frame we are about to read. The reader only
            // advances past frames that verify, so on failure this is the
            // truncation point.
            let frame_start = reader.offset();

            match reader.next_record() {
                Ok(NextRecord::Record(record)) => {
                    if record.lsn <= last_lsn {
                        let msg = format!(
                            "WAL sequence violation at offset {}: lsn {} after {}",
                            frame_start, record.lsn, last_lsn
                        );
                        if salvage {
                            warn!("{msg}; dropping remainder of log");
                            truncated = true;
                            bytes_dropped = file_len - frame_start;
                            break;
                        }
                        return Err(Error::Corruption(msg));
                    }
                    last_lsn = record.lsn;
                    records.push(record);
                }
                Ok(NextRecord::End) => break,
                Ok(NextRecord::Torn { offset }) => {
                    // An interrupted final append. Dropping it is the
                    // normal outcome, not an error.
                    truncated = true;
                    bytes_dropped = file_len - offset;
                    warn!(
                        offset,
                        bytes_dropped, "dropping torn record at WAL tail"
                    );
                    break;
                }
                Err(err) if salvage && err.is_corruption() => {
                    truncated = true;
                    bytes_dropped = file_len - frame_start;
                    warn!(
                        offset = frame_start,
                        bytes_dropped, "salvage stopping at damaged frame: {err}"
                    );
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        let report = RecoveryReport {
            records_recovered: records.len() as u64,
            bytes_dropped,
            last_lsn,
            truncated,
        };

        Ok((records, report))
    }
}
