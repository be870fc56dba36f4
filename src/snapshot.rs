//! Snapshot
//!
//! A frozen, point-in-time view of the store.
//!
//! ## Responsibilities
//! - Serve reads from the state as it was at creation
//! - Stay unaffected by writes committed after creation
//! - Release the captured state on close; later reads fail with `Closed`
//!
//! A snapshot pins its view, not the store: the handle that created it can
//! keep committing (or even close) without disturbing reads here.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::config::ScanOptions;
use crate::cursor::Cursor;
use crate::error::{Error, Result};

/// An isolated, read-only view of the store at a single moment
///
/// Created by [`Database::snapshot`](crate::Database::snapshot). Every read
/// through the snapshot sees exactly the committed state from that moment;
/// concurrent and later writes are invisible.
///
/// Snapshots are independently owned: release one with
/// [`close`](Snapshot::close) (or just drop it) without involving the
/// database handle.
pub struct Snapshot {
    /// Captured view; `None` once closed
    view: RwLock<Option<Arc<BTreeMap<Bytes, Bytes>>>>,
}

impl Snapshot {
    pub(crate) fn new(view: Arc<BTreeMap<Bytes, Bytes>>) -> Self {
        Self {
            view: RwLock::new(Some(view)),
        }
    }

    /// Get a value by key, as of the snapshot's moment
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        match self.view.read().as_ref() {
            Some(map) => Ok(map.get(key.as_ref()).cloned()),
            None => Err(Error::Closed("snapshot")),
        }
    }

    /// Create a cursor over the snapshot's view
    pub fn iter(&self, options: ScanOptions) -> Result<Cursor> {
        match self.view.read().as_ref() {
            Some(map) => Ok(Cursor::new(Arc::clone(map), options)),
            None => Err(Error::Closed("snapshot")),
        }
    }

    /// Visit every in-range entry with a callback
    ///
    /// Entries arrive in traversal order. Returns how many entries were
    /// visited; an empty range means zero calls and `Ok(0)`.
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

    /// Release the captured view
    ///
    /// Further reads fail with [`Error::Closed`]. Closing an already-closed
    /// snapshot is a no-op.
    pub fn close(&self) {
        self.view.write().take();
    }

    /// True once the snapshot has been closed
    pub fn is_closed(&self) -> bool {
        self.view.read().is_none()
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let view = self.view.read();
        f.debug_struct("Snapshot")
            .field("closed", &view.is_none())
            .field("entries", &view.as_ref().map(|m| m.len()))
            .finish()
    }
}
