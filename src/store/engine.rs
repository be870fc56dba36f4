//! Store Engine
//!
//! The core storage engine: an ordered in-memory map made durable by a
//! write-ahead log.
//!
//! ## Responsibilities
//! - Rebuild the map from the log on open
//! - Serialize commits: one log record, then apply to the map
//! - Serve point reads and frozen views concurrently
//! - Rewrite the log when it outgrows the compaction threshold

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{OpenOptions, SyncStrategy};
use crate::error::{Error, Result};
use crate::wal::{Mutation, RecoveryReport, WalRecovery, WalWriter};

use super::WAL_FILENAME;

/// The persistent ordered map
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Commits**: serialized by the `wal` mutex, which is held across both
///   the log append and the map update. Log order therefore matches apply
///   order, and readers never observe a half-applied batch.
/// - **Reads** (get/view/len): take the map's read lock only. They run
///   concurrently with each other and block a commit only for its map-update
///   step, never for its I/O.
///
/// Lock order is always `wal` then `map`. Nothing takes them in the other
/// order, so the pair cannot deadlock.
#[derive(Debug)]
pub struct OrderedStore {
    /// Directory holding the store's files
    path: PathBuf,

    /// The ordered map itself; `Bytes` values make frozen views cheap to share
    map: RwLock<BTreeMap<Bytes, Bytes>>,

    /// Log writer; `None` once the store has shut down
    wal: Mutex<Option<WalWriter>>,

    /// Captured at open for compaction rewrites
    sync_strategy: SyncStrategy,

    /// Rewrite the log once it exceeds this many bytes
    compact_threshold: u64,
}

impl OrderedStore {
    /// Open a store directory, replaying its log if one exists
    ///
    /// On startup:
    /// 1. Replay the log into a fresh map, verifying every frame
    /// 2. If the tail was torn, rewrite the log from the replayed state
    /// 3. Open the writer at the next LSN
    ///
    /// Policy decisions (missing vs. existing store, locking) belong to the
    /// caller; this always creates the log file when none is present.
    pub fn open(dir: &Path, options: &OpenOptions) -> Result<(Self, Option<RecoveryReport>)> {
        let wal_path = dir.join(WAL_FILENAME);

        // Step 1: Replay the log if one exists
        let mut map = BTreeMap::new();
        let mut next_lsn = 1;
        let mut report = None;

        if wal_path.exists() {
            let (records, recovery) = WalRecovery::recover(&wal_path)?;
            for record in records {
                for mutation in record.mutations {
                    apply(&mut map, mutation);
                }
            }
            next_lsn = recovery.last_lsn + 1;
            report = Some(recovery);
        }

        // Step 2: A torn tail means the file still carries the partial
        // frame's bytes. Rewriting from the replayed state drops them and
        // leaves a clean log to append to.
        let truncated = report.as_ref().map_or(false, |r| r.truncated);
        let writer = if truncated {
            WalWriter::rewrite_compacted(&wal_path, options.sync_strategy, next_lsn, &map)?
        } else {
            WalWriter::open(&wal_path, options.sync_strategy, next_lsn)?
        };

        if let Some(recovery) = &report {
            info!(
                path = %dir.display(),
                records = recovery.records_recovered,
                keys = map.len(),
                truncated = recovery.truncated,
                "log replayed"
            );
        }

        let store = Self {
            path: dir.to_path_buf(),
            map: RwLock::new(map),
            wal: Mutex::new(Some(writer)),
            sync_strategy: options.sync_strategy,
            compact_threshold: options.compact_threshold,
        };
        Ok((store, report))
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.map.read().get(key).cloned()
    }

    /// Commit a batch of mutations as one atomic record
    ///
    /// Steps:
    /// 1. Append one record to the log (durability)
    /// 2. Apply the mutations to the map in order
    /// 3. Compact if the log has outgrown its threshold
    ///
    /// If the append fails the map is untouched and the batch simply never
    /// happened. Returns the LSN the record was assigned.
    pub fn commit(&self, mutations: Vec<Mutation>) -> Result<u64> {
        let mut wal = self.wal.lock();
        let writer = wal.as_mut().ok_or(Error::Closed("store"))?;

        // Step 1: Log first
        let lsn = writer.append(&mutations)?;
        let needs_compact = writer.len_bytes() > self.compact_threshold;

        // Step 2: Apply in order, moving the mutation buffers into the map
        {
            let mut map = self.map.write();
            for mutation in mutations {
                apply(&mut map, mutation);
            }
        }

        // Step 3: Housekeeping. The record is already durable, so a failed
        // rewrite only defers compaction to a later commit; it must not turn
        // an acknowledged batch into an error.
        if needs_compact {
            if let Err(err) = self.compact_locked(&mut wal) {
                warn!(path = %self.path.display(), "compaction after commit failed: {err}");
            }
        }

        Ok(lsn)
    }

    /// Frozen point-in-time view of the whole map
    ///
    /// Structural O(n) clone under the read lock; the `Bytes` keys and
    /// values are refcounted, so entry payloads are shared, not copied.
    pub fn view(&self) -> Arc<BTreeMap<Bytes, Bytes>> {
        Arc::new(self.map.read().clone())
    }

    /// Force a log rewrite regardless of size
    pub fn compact(&self) -> Result<()> {
        let mut wal = self.wal.lock();
        if wal.is_none() {
            return Err(Error::Closed("store"));
        }
        self.compact_locked(&mut wal)
    }

    /// Rewrite the log as a compact snapshot of the live map
    ///
    /// Called with the log mutex held. A failed rewrite never touches the
    /// log file itself, so the store keeps appending to the old (still
    /// valid) log; the new writer's handle rides the rewrite's rename, so
    /// once it lands every later append goes to the new file.
    fn compact_locked(&self, wal: &mut Option<WalWriter>) -> Result<()> {
        let writer = wal.as_ref().ok_or(Error::Closed("store"))?;
        let next_lsn = writer.next_lsn();
        let old_bytes = writer.len_bytes();

        let map = self.map.read();
        let new_writer = WalWriter::rewrite_compacted(
            &self.path.join(WAL_FILENAME),
            self.sync_strategy,
            next_lsn,
            &map,
        )?;
        drop(map);

        debug!(
            path = %self.path.display(),
            old_bytes,
            new_bytes = new_writer.len_bytes(),
            "log compacted"
        );
        *wal = Some(new_writer);
        Ok(())
    }

    /// Force any buffered log frames down to disk
    pub fn sync(&self) -> Result<()> {
        match self.wal.lock().as_mut() {
            Some(writer) => writer.sync(),
            None => Err(Error::Closed("store")),
        }
    }

    /// Sync and drop the log writer; later commits fail with `Closed`
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) -> Result<()> {
        let mut wal = self.wal.lock();
        if let Some(writer) = wal.as_mut() {
            writer.sync()?;
        }
        *wal = None;
        Ok(())
    }

    /// Rebuild a store's log from its longest valid prefix
    ///
    /// Replays what can be salvaged, rewrites the log from that state, and
    /// reports what was dropped. The store must not be open; the caller
    /// enforces that.
    pub fn repair(dir: &Path) -> Result<RecoveryReport> {
        let wal_path = dir.join(WAL_FILENAME);
        let (records, report) = WalRecovery::salvage(&wal_path)?;

        let mut map = BTreeMap::new();
        for record in records {
            for mutation in record.mutations {
                apply(&mut map, mutation);
            }
        }

        // Rewrite unconditionally; even an undamaged log shrinks to its
        // live state.
        let next_lsn = report.last_lsn + 1;
        WalWriter::rewrite_compacted(&wal_path, SyncStrategy::EveryCommit, next_lsn, &map)?;

        info!(
            path = %dir.display(),
            records = report.records_recovered,
            bytes_dropped = report.bytes_dropped,
            truncated = report.truncated,
            "store repaired"
        );
        Ok(report)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Directory holding the store's files
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// True if the store holds no live keys
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Current log length in bytes (0 after shutdown)
    pub fn log_bytes(&self) -> u64 {
        self.wal.lock().as_ref().map_or(0, |w| w.len_bytes())
    }
}

/// Apply one mutation to the map; within a batch, last write wins
fn apply(map: &mut BTreeMap<Bytes, Bytes>, mutation: Mutation) {
    match mutation {
        Mutation::Put { key, value } => {
            map.insert(Bytes::from(key), Bytes::from(value));
        }
        Mutation::Delete { key } => {
            map.remove(key.as_slice());
        }
    }
}
