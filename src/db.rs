//! Database Handle
//!
//! The public face of the store: lifecycle, reads, writes, batches,
//! snapshots, and cursors.
//!
//! ## Responsibilities
//! - Enforce the open/close lifecycle (everything except `close` fails once
//!   the handle is closed)
//! - Enforce one live handle per path within the process
//! - Route reads and writes to the ordered store
//! - Hand out snapshots and cursors over frozen views

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::batch::WriteBatch;
use crate::config::{OpenOptions, ScanOptions};
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::snapshot::Snapshot;
use crate::store::{OrderedStore, LOCK_FILENAME, WAL_FILENAME};
use crate::wal::{Mutation, RecoveryReport};

/// Canonical paths with a live handle in this process
///
/// Backs the one-handle-per-path policy. Cross-process exclusion is out of
/// scope; the on-disk LOCK marker is advisory only.
static OPEN_STORES: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// A scoped claim on a canonical path in [`OPEN_STORES`], released on drop
///
/// `open` claims a path for the life of its handle; `repair` and `destroy`
/// hold one of these only while they run. Both go through the same registry
/// insert, so a lifecycle operation can never interleave with an open on the
/// same path: whichever claims first wins and the other fails.
struct PathClaim {
    path: PathBuf,
}

impl PathClaim {
    fn acquire(path: PathBuf, action: &'static str) -> Result<Self> {
        if !OPEN_STORES.lock().insert(path.clone()) {
            return Err(Error::Storage(format!(
                "store at {} is still open; close it before {}",
                path.display(),
                action
            )));
        }
        Ok(Self { path })
    }
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        OPEN_STORES.lock().remove(&self.path);
    }
}

/// An open handle to a store
///
/// All methods take `&self`; the handle is safe to share across threads.
/// Reads never block each other, writes serialize internally, and a reader
/// never observes a half-applied batch.
///
/// ## Example
/// ```no_run
/// use vellum::{Database, OpenOptions};
///
/// let db = Database::open("/tmp/demo", &OpenOptions::default())?;
/// db.put("alpha", "1")?;
/// assert_eq!(db.get("alpha")?.as_deref(), Some(&b"1"[..]));
/// db.close()?;
/// # Ok::<(), vellum::Error>(())
/// ```
pub struct Database {
    /// Canonical store directory, fixed at open
    path: PathBuf,

    store: OrderedStore,

    /// Set once by `close`; checked before every operation
    closed: AtomicBool,
}

impl Database {
    /// Open or create a store at `path`
    ///
    /// A store exists at a path when its log file does. Per `options`:
    /// a missing store is created (`create_if_missing`, the default) or
    /// rejected with [`Error::NotFound`]; an existing store is opened or,
    /// with `error_if_exists`, rejected with [`Error::AlreadyExists`].
    ///
    /// Opening replays the log, so the handle is ready to serve reads as
    /// soon as this returns. A second handle to the same path in this
    /// process is refused until the first is closed.
    pub fn open(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();

        // Step 1: Existence policy, judged by the log file
        let exists = path.join(WAL_FILENAME).exists();
        if exists && options.error_if_exists {
            return Err(Error::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        if !exists && !options.create_if_missing {
            return Err(Error::NotFound {
                path: path.to_path_buf(),
            });
        }

        // Step 2: Make the directory real so the path canonicalizes
        fs::create_dir_all(path)?;
        let canonical = fs::canonicalize(path)?;

        // Step 3: Claim the path before touching its files
        if !OPEN_STORES.lock().insert(canonical.clone()) {
            return Err(Error::Storage(format!(
                "store at {} is already open in this process",
                canonical.display()
            )));
        }

        // Step 4: Open the store, releasing the claim if that fails
        let (store, _report) = match OrderedStore::open(&canonical, options) {
            Ok(opened) => opened,
            Err(err) => {
                OPEN_STORES.lock().remove(&canonical);
                return Err(err);
            }
        };

        // Step 5: Leave an advisory marker. Stale markers from a crashed
        // process are overwritten here, never trusted.
        let _ = fs::write(
            canonical.join(LOCK_FILENAME),
            format!("{}\n", process::id()),
        );

        info!(path = %canonical.display(), keys = store.len(), "database opened");
        Ok(Self {
            path: canonical,
            store,
            closed: AtomicBool::new(false),
        })
    }

    /// Get the value for `key`
    ///
    /// An absent key is `Ok(None)`, not an error.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        Ok(self.store.get(key.as_ref()))
    }

    /// Upsert `key` to `value`
    ///
    /// There is no insert/update distinction; the write is durable (per the
    /// sync strategy) when this returns.
    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.ensure_open()?;
        self.store.commit(vec![Mutation::Put {
            key: key.as_ref().to_vec(),
            value: value.as_ref().to_vec(),
        }])?;
        Ok(())
    }

    /// Remove `key` if present
    ///
    /// Deleting an absent key succeeds silently.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        self.ensure_open()?;
        self.store.commit(vec![Mutation::Delete {
            key: key.as_ref().to_vec(),
        }])?;
        Ok(())
    }

    /// Commit a pre-built batch as one atomic, durable unit
    ///
    /// Either every mutation in the batch takes effect or none do, even
    /// across a crash mid-commit. An empty batch commits nothing and writes
    /// no log record.
    ///
    /// A commit is one log record, and a record's encoded payload is capped
    /// at 256 MiB; a batch past that is refused with [`Error::Storage`]
    /// before anything reaches the log.
    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        self.ensure_open()?;
        if batch.is_empty() {
            return Ok(());
        }
        self.store.commit(batch.into_mutations())?;
        Ok(())
    }

    /// Populate a batch with a closure and commit it atomically
    ///
    /// The closure stages mutations on the batch it is given; nothing
    /// touches the store until it returns. If it returns an error (or
    /// panics), the batch is discarded and no mutation is applied.
    ///
    /// ## Example
    /// ```no_run
    /// # use vellum::{Database, OpenOptions};
    /// # let db = Database::open("/tmp/demo", &OpenOptions::default())?;
    /// db.batch(|b| {
    ///     b.put("alpha", "1");
    ///     b.delete("beta");
    ///     Ok(())
    /// })?;
    /// # Ok::<(), vellum::Error>(())
    /// ```
    pub fn batch<F>(&self, populate: F) -> Result<()>
    where
        F: FnOnce(&mut WriteBatch) -> Result<()>,
    {
        self.ensure_open()?;
        let mut batch = WriteBatch::new();
        populate(&mut batch)?;
        self.write(batch)
    }

    /// Capture a frozen, point-in-time view of the store
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.ensure_open()?;
        Ok(Snapshot::new(self.store.view()))
    }

    /// Create a cursor over the store's current state
    ///
    /// The cursor traverses the state as of this call; writes committed
    /// while it is in use are not visible through it.
    pub fn iter(&self, options: ScanOptions) -> Result<Cursor> {
        self.ensure_open()?;
        Ok(Cursor::new(self.store.view(), options))
    }

    /// Visit every in-range entry with a callback
    ///
    /// Entries arrive in traversal order. Returns how many entries were
    /// visited; an empty store (or empty range) means zero calls and
    /// `Ok(0)`.
    pub fn for_each<F>(&self, options: ScanOptions, mut visit: F) -> Result<usize>
    where
        F: FnMut(&[u8], &[u8]),
    {
        let cursor = self.iter(options)?;
        let mut visited = 0;
        for (key, value) in cursor {
            visit(&key, &value);
            visited += 1;
        }
        Ok(visited)
    }

    /// Force any buffered log frames down to disk
    ///
    /// Only meaningful under [`SyncStrategy::EveryNCommits`](crate::SyncStrategy);
    /// with the default strategy every commit is already synced.
    pub fn sync(&self) -> Result<()> {
        self.ensure_open()?;
        self.store.sync()
    }

    /// Close the handle, releasing the store
    ///
    /// Pending log frames are synced first. Closing an already-closed
    /// handle is a no-op; every other operation on a closed handle fails
    /// with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let result = self.store.shutdown();

        // Release the path claim even if the final sync failed; the handle
        // is unusable either way.
        let _ = fs::remove_file(self.path.join(LOCK_FILENAME));
        OPEN_STORES.lock().remove(&self.path);

        info!(path = %self.path.display(), "database closed");
        result
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed("database"));
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Canonical directory this handle is bound to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once the handle has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of live keys
    pub fn len(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.store.len())
    }

    /// True if the store holds no live keys
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            if let Err(err) = self.close() {
                warn!(path = %self.path.display(), "close on drop failed: {err}");
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// Module-Level Lifecycle Operations
// =============================================================================

/// Rebuild a possibly damaged store from the longest valid prefix of its log
///
/// Commits at and after the first damaged frame are lost; everything before
/// it survives and the log is rewritten clean. Returns a report of what was
/// kept and dropped.
///
/// Fails with [`Error::NotFound`] if no store exists at `path`, and with
/// [`Error::Storage`] if the store is open in this process.
pub fn repair(path: impl AsRef<Path>) -> Result<RecoveryReport> {
    let path = path.as_ref();
    if !path.join(WAL_FILENAME).exists() {
        return Err(Error::NotFound {
            path: path.to_path_buf(),
        });
    }

    // Claiming the path (rather than just checking it) keeps a concurrent
    // open out for the whole rebuild.
    let canonical = fs::canonicalize(path)?;
    let _claim = PathClaim::acquire(canonical.clone(), "repairing")?;

    OrderedStore::repair(&canonical)
}

/// Irreversibly delete all on-disk state for the store at `path`
///
/// Removes the store directory and everything in it. Destroying a path with
/// no store is a quiet no-op. Fails with [`Error::Storage`] if the store is
/// open in this process.
pub fn destroy(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if !path.join(WAL_FILENAME).exists() {
        return Ok(());
    }

    // Claiming the path (rather than just checking it) means no handle can
    // open the store between the check and the removal.
    let canonical = fs::canonicalize(path)?;
    let _claim = PathClaim::acquire(canonical.clone(), "destroying")?;

    match fs::remove_dir_all(&canonical) {
        Ok(()) => {}
        // A concurrent destroy got there first; the contract is "gone after"
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    info!(path = %canonical.display(), "store destroyed");
    Ok(())
}
