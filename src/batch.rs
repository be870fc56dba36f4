//! Write Batch
//!
//! Staged mutations that commit atomically.
//!
//! ## Responsibilities
//! - Collect puts and deletes without touching the store
//! - Preserve insertion order so later writes shadow earlier ones
//! - Hand the staged mutations to the store for a single-record commit

use crate::wal::Mutation;

/// An ordered set of mutations applied as one atomic commit.
///
/// A batch is inert until passed to [`Database::write`](crate::Database::write);
/// dropping it without committing discards every staged mutation. Mutations
/// apply in insertion order, so the last write to a key within a batch wins.
///
/// ## Example
/// ```no_run
/// use vellum::{Database, OpenOptions, WriteBatch};
///
/// let db = Database::open("/tmp/demo", &OpenOptions::default())?;
/// let mut batch = WriteBatch::new();
/// batch.put("alpha", "1");
/// batch.put("beta", "2");
/// batch.delete("gamma");
/// db.write(batch)?;
/// # Ok::<(), vellum::Error>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    ops: Vec<Mutation>,
}

impl WriteBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Stage a put of `key` to `value`
    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> &mut Self {
        self.ops.push(Mutation::Put {
            key: key.as_ref().to_vec(),
            value: value.as_ref().to_vec(),
        });
        self
    }

    /// Stage a delete of `key`
    ///
    /// Deleting a key that does not exist is not an error; the mutation is
    /// simply a no-op at apply time.
    pub fn delete(&mut self, key: impl AsRef<[u8]>) -> &mut Self {
        self.ops.push(Mutation::Delete {
            key: key.as_ref().to_vec(),
        });
        self
    }

    /// Number of staged mutations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True if nothing has been staged
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Discard all staged mutations, leaving the batch reusable
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Consume the batch, yielding its mutations in insertion order
    pub(crate) fn into_mutations(self) -> Vec<Mutation> {
        self.ops
    }
}
