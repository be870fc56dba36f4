//! Cursor
//!
//! Bounded, directional traversal over a frozen view of the store.
//!
//! ## Responsibilities
//! - Honor `from`/`to` bounds with nearest-neighbor positioning
//! - Yield in ascending or descending key order
//! - Stop after `limit` entries regardless of bounds
//! - Support pull-style use (`next`/`has_next`/`rewind`) and composition
//!   with the standard iterator adapters
//!
//! The cursor walks an immutable view captured when it was created, so a
//! traversal is repeatable: `rewind` replays exactly the same sequence even
//! if the live store has moved on since.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::ScanOptions;

/// Where the cursor stands in its traversal
#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    /// Freshly created or rewound; the next advance seeks to the start
    Unstarted,

    /// Holds the last key yielded; the next advance seeks strictly past it
    Positioned(Bytes),

    /// No further in-range entries (or the limit was reached); terminal
    /// until a rewind
    Exhausted,
}

/// A bounded, directional cursor over an ordered view
///
/// Created by [`Database::iter`](crate::Database::iter) or
/// [`Snapshot::iter`](crate::Snapshot::iter). Bounds are inclusive and need
/// not name keys that exist; positioning is nearest-neighbor (smallest key at
/// or above `from`, largest at or below `to`). Exhaustion is reported as
/// `None`, never as an error, and is terminal until
/// [`rewind`](Cursor::rewind).
///
/// `Cursor` implements [`Iterator`], so the standard adapters compose:
///
/// ```no_run
/// use vellum::{Database, OpenOptions, ScanOptions};
///
/// let db = Database::open("/tmp/demo", &OpenOptions::default())?;
/// let pairs: Vec<_> = db
///     .iter(ScanOptions::new().from("a").to("m").limit(10))?
///     .collect();
/// # Ok::<(), vellum::Error>(())
/// ```
pub struct Cursor {
    /// Frozen view this cursor traverses
    view: Arc<BTreeMap<Bytes, Bytes>>,

    /// Inclusive lower bound
    from: Option<Bytes>,

    /// Inclusive upper bound
    to: Option<Bytes>,

    /// Maximum entries to yield across the whole traversal
    limit: Option<usize>,

    /// Descending key order when set
    reverse: bool,

    position: Position,

    /// Entries yielded since creation or the last rewind
    yielded: usize,

    /// Entry produced by a look-ahead and not yet consumed
    peeked: Option<(Bytes, Bytes)>,
}

impl Cursor {
    pub(crate) fn new(view: Arc<BTreeMap<Bytes, Bytes>>, options: ScanOptions) -> Self {
        Self {
            view,
            from: options.from,
            to: options.to,
            limit: options.limit,
            reverse: options.reverse,
            position: Position::Unstarted,
            yielded: 0,
            peeked: None,
        }
    }

    /// Whether another call to [`next`](Iterator::next) would yield an entry
    ///
    /// Look-ahead only: the predicted entry is buffered and returned by the
    /// following `next`, so the observed sequence is unchanged.
    pub fn has_next(&mut self) -> bool {
        if self.peeked.is_none() {
            self.peeked = self.advance();
        }
        self.peeked.is_some()
    }

    /// Reset to the initial position
    ///
    /// The yielded count starts over, so the full traversal (same bounds,
    /// same limit, same direction) replays from the beginning.
    pub fn rewind(&mut self) {
        self.position = Position::Unstarted;
        self.yielded = 0;
        self.peeked = None;
    }

    /// Seek to the next in-range entry and yield it
    ///
    /// Each advance is one bounded range lookup against the view, with the
    /// cursor's position folded into the bounds:
    /// - unstarted: `[from, to]` and take the first (forward) or last
    ///   (reverse) entry
    /// - positioned at `k`: `(k, to]` forward, `[from, k)` reverse
    ///
    /// The lookup itself enforces the opposite bound, so a traversal that has
    /// passed `to` (or `from` in reverse) comes back empty and exhausts.
    fn advance(&mut self) -> Option<(Bytes, Bytes)> {
        if let Some(limit) = self.limit {
            if self.yielded >= limit {
                self.position = Position::Exhausted;
                return None;
            }
        }
        if self.position == Position::Exhausted {
            return None;
        }

        // An inverted range is empty, not an error. BTreeMap::range would
        // panic on it, so it never reaches the lookup.
        if let (Some(from), Some(to)) = (&self.from, &self.to) {
            if from > to {
                self.position = Position::Exhausted;
                return None;
            }
        }

        let current = match &self.position {
            Position::Positioned(key) => Some(key.clone()),
            _ => None,
        };

        let lower: Bound<&[u8]> = match (&current, self.reverse) {
            (Some(key), false) => Bound::Excluded(key.as_ref()),
            _ => match &self.from {
                Some(from) => Bound::Included(from.as_ref()),
                None => Bound::Unbounded,
            },
        };
        let upper: Bound<&[u8]> = match (&current, self.reverse) {
            (Some(key), true) => Bound::Excluded(key.as_ref()),
            _ => match &self.to {
                Some(to) => Bound::Included(to.as_ref()),
                None => Bound::Unbounded,
            },
        };

        let mut range = self.view.range::<[u8], _>((lower, upper));
        let entry = if self.reverse {
            range.next_back()
        } else {
            range.next()
        };

        match entry {
            Some((key, value)) => {
                let pair = (key.clone(), value.clone());
                self.position = Position::Positioned(pair.0.clone());
                self.yielded += 1;
                Some(pair)
            }
            None => {
                self.position = Position::Exhausted;
                None
            }
        }
    }
}

impl Iterator for Cursor {
    type Item = (Bytes, Bytes);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(pair) = self.peeked.take() {
            return Some(pair);
        }
        self.advance()
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("limit", &self.limit)
            .field("reverse", &self.reverse)
            .field("position", &self.position)
            .field("yielded", &self.yielded)
            .finish()
    }
}
