//! Log writer
//!
//! Handles appending commit records to the log file, fsync policy, and the
//! compaction rewrite.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::config::SyncStrategy;
use crate::error::{Error, Result};

use super::record::{encode_frame, Mutation, MAX_PAYLOAD_LEN};

/// Appends commit records to the log file
#[derive(Debug)]
pub struct WalWriter {
    path: PathBuf,

    /// Append-mode handle. Every record goes down in one `write_all`, so no
    /// record bytes ever sit in a userspace buffer between appends.
    file: File,

    /// LSN the next appended record will carry
    next_lsn: u64,

    /// How often to fsync
    sync_strategy: SyncStrategy,

    /// Commits appended since the last fsync
    unsynced_commits: usize,

    /// Current length of the log file in bytes
    len_bytes: u64,

    /// Set when a failed append's partial bytes could not be removed. All
    /// later appends are refused so nothing is written after the damage.
    poisoned: bool,
}

impl WalWriter {
    /// Open or create a log file for appending
    ///
    /// `next_lsn` comes from recovery (last replayed LSN + 1, or 1 for a
    /// fresh store).
    pub fn open(path: &Path, sync_strategy: SyncStrategy, next_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len_bytes = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_lsn,
            sync_strategy,
            unsynced_commits: 0,
            len_bytes,
            poisoned: false,
        })
    }

    /// Append one commit record; returns the LSN it was assigned
    ///
    /// The record is on disk (per the sync strategy) before this returns, so
    /// a batch is durable as a unit or not at all. A failed append is rolled
    /// back by truncating the file to the last record boundary, leaving the
    /// log exactly as it was; if even that fails the writer goes offline and
    /// every later append is refused with [`Error::Storage`].
    pub fn append(&mut self, mutations: &[Mutation]) -> Result<u64> {
        if self.poisoned {
            return Err(Error::Storage(
                "log writer is offline after an unrecovered append failure; reopen the store"
                    .into(),
            ));
        }

        let lsn = self.next_lsn;
        let frame = encode_frame(lsn, mutations)?;
        let prior_unsynced = self.unsynced_commits;

        if let Err(err) = self.write_frame(&frame) {
            self.unsynced_commits = prior_unsynced;
            self.drop_partial_frame();
            return Err(err);
        }

        self.next_lsn += 1;
        self.len_bytes += frame.len() as u64;
        Ok(lsn)
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.file.write_all(frame)?;
        self.unsynced_commits += 1;
        match self.sync_strategy {
            SyncStrategy::EveryCommit => self.sync(),
            SyncStrategy::EveryNCommits { count } => {
                if self.unsynced_commits >= count {
                    self.sync()
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Truncate away whatever a failed append left in the file, so the log
    /// still ends at the last acknowledged record. The truncation is synced
    /// as well; a record reported as failed must not resurface after a
    /// crash. If any of this fails the writer goes offline rather than risk
    /// a later record landing after the leftover bytes.
    fn drop_partial_frame(&mut self) {
        let restored = self
            .file
            .set_len(self.len_bytes)
            .and_then(|()| self.file.sync_data());
        if let Err(err) = restored {
            warn!(
                path = %self.path.display(),
                "could not roll back a failed append: {err}; log writer offline"
            );
            self.poisoned = true;
        }
    }

    /// Force everything unsynced down to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced_commits = 0;
        Ok(())
    }

    /// LSN the next appended record will carry
    pub fn next_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Current log length in bytes
    pub fn len_bytes(&self) -> u64 {
        self.len_bytes
    }

    /// Commits appended since the last fsync
    pub fn unsynced_commits(&self) -> usize {
        self.unsynced_commits
    }

    /// Rewrite the log as a compact snapshot of `live`, replacing the file
    /// at `path`, and return a fresh writer over the result.
    ///
    /// The caller must have closed any previous writer on `path`. The new
    /// content goes to a temp file first, and the returned writer's handle
    /// is opened on that temp file before the rename, so it follows the
    /// inode into place and nothing fallible remains after the rename. An
    /// error from here therefore always means the log named `path` was left
    /// untouched.
    pub fn rewrite_compacted(
        path: &Path,
        sync_strategy: SyncStrategy,
        next_lsn: u64,
        live: &BTreeMap<Bytes, Bytes>,
    ) -> Result<Self> {
        let tmp_path = path.with_extension("tmp");
        let mut lsn = next_lsn;

        {
            let mut file = File::create(&tmp_path)?;

            // Pack entries into as few records as the payload cap allows.
            // Every entry got here through a record that fit under the cap,
            // so no single entry can exceed it on its own.
            let empty_payload = bincode::serialized_size(&Vec::<Mutation>::new())?;
            let mut pending: Vec<Mutation> = Vec::new();
            let mut pending_bytes = empty_payload;

            for (key, value) in live {
                let mutation = Mutation::Put {
                    key: key.to_vec(),
                    value: value.to_vec(),
                };
                let cost = bincode::serialized_size(&mutation)?;
                if !pending.is_empty() && pending_bytes + cost > MAX_PAYLOAD_LEN as u64 {
                    file.write_all(&encode_frame(lsn, &pending)?)?;
                    lsn += 1;
                    pending.clear();
                    pending_bytes = empty_payload;
                }
                pending.push(mutation);
                pending_bytes += cost;
            }

            // An empty store compacts to an empty log; no placeholder record
            if !pending.is_empty() {
                file.write_all(&encode_frame(lsn, &pending)?)?;
                lsn += 1;
            }

            file.sync_all()?;
        }

        // The long-lived append handle is taken on the temp file and rides
        // the rename.
        let file = OpenOptions::new().append(true).open(&tmp_path)?;
        let len_bytes = file.metadata()?.len();
        let writer = Self {
            path: path.to_path_buf(),
            file,
            next_lsn: lsn,
            sync_strategy,
            unsynced_commits: 0,
            len_bytes,
            poisoned: false,
        };

        std::fs::rename(&tmp_path, path)?;
        sync_parent_dir(path);

        debug!(
            path = %path.display(),
            entries = live.len(),
            bytes = writer.len_bytes(),
            "log rewritten"
        );
        Ok(writer)
    }

    /// Path of the log file this writer appends to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Best-effort fsync of the directory containing `path`, making a rename
/// durable. Ignored on platforms where directories cannot be opened.
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}
