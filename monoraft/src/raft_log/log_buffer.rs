use crate::entry::Entry;
use crate::storage::Snapshot;

/// The in-memory part of the log, above the durable Storage prefix.
///
/// The two states are exclusive: either the node holds a plain tail of
/// not-yet-persisted entries, or it is restoring from a snapshot that
/// replaces the whole log (entries accepted after the snapshot arrive in the
/// same state, starting right above the snapshot boundary).
///
/// Transitions:
/// - `restore(snap)`: any state → `Restoring { snap, entries: [] }`.
/// - `stable_snap()`: `Restoring { snap, entries }` → `Tail { offset: snap.index + 1, entries }`.
/// - `stable_to(i)`: drops buffered entries up to `i`; only defined on `Tail`
///   (a pending snapshot must be persisted first).
#[derive(Debug, Clone)]
pub(crate) enum LogBuffer {
    Tail {
        /// Index of the first buffered entry; everything below is durable.
        offset: u64,
        entries: Vec<Entry>,
    },

    Restoring {
        snapshot: Snapshot,
        /// Entries accepted after the snapshot, starting at `snapshot.meta.index + 1`.
        entries: Vec<Entry>,
    },
}

impl LogBuffer {
    pub(crate) fn new(offset: u64) -> Self {
        LogBuffer::Tail {
            offset,
            entries: Vec::new(),
        }
    }

    /// The index the first buffered entry has (or would have).
    pub(crate) fn offset(&self) -> u64 {
        match self {
            LogBuffer::Tail { offset, .. } => *offset,
            LogBuffer::Restoring { snapshot, .. } => snapshot.meta.index + 1,
        }
    }

    pub(crate) fn entries(&self) -> &[Entry] {
        match self {
            LogBuffer::Tail { entries, .. } => entries,
            LogBuffer::Restoring { entries, .. } => entries,
        }
    }

    pub(crate) fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            LogBuffer::Tail { .. } => None,
            LogBuffer::Restoring { snapshot, .. } => Some(snapshot),
        }
    }

    /// The last index this buffer knows about, if it knows any.
    pub(crate) fn last_index(&self) -> Option<u64> {
        match self {
            LogBuffer::Tail { offset, entries } => {
                if entries.is_empty() {
                    None
                } else {
                    Some(offset + entries.len() as u64 - 1)
                }
            }
            LogBuffer::Restoring { snapshot, entries } => {
                Some(snapshot.meta.index + entries.len() as u64)
            }
        }
    }

    /// The term at `idx`, if `idx` is buffered or is the snapshot boundary.
    pub(crate) fn maybe_term(&self, idx: u64) -> Option<u64> {
        if let LogBuffer::Restoring { snapshot, .. } = self {
            if idx == snapshot.meta.index {
                return Some(snapshot.meta.term);
            }
        }

        let offset = self.offset();
        if idx < offset {
            return None;
        }
        self.entries().get((idx - offset) as usize).map(|e| e.term)
    }

    /// Append `ents`, truncating any buffered suffix they conflict with.
    ///
    /// `ents` must be contiguous with the log: the caller has already checked
    /// `ents[0].index` against the commit point and the last index.
    pub(crate) fn truncate_and_append(&mut self, ents: &[Entry]) {
        let first = match ents.first() {
            Some(e) => e.index,
            None => return,
        };

        let offset = self.offset();
        match self {
            LogBuffer::Tail { offset: off, entries } => {
                if first <= offset {
                    // The incoming entries replace the whole buffer.
                    *off = first;
                    entries.clear();
                } else {
                    entries.truncate((first - offset) as usize);
                }
                entries.extend_from_slice(ents);
            }
            LogBuffer::Restoring { entries, .. } => {
                // Entries following a pending snapshot always start above the
                // snapshot boundary, so `first >= offset` here.
                entries.truncate((first - offset) as usize);
                entries.extend_from_slice(ents);
            }
        }
    }

    /// Forget the snapshot and everything before it; a new tail begins right
    /// above the snapshot boundary.
    pub(crate) fn restore(&mut self, snapshot: Snapshot) {
        *self = LogBuffer::Restoring {
            snapshot,
            entries: Vec::new(),
        };
    }

    /// The pending snapshot has been persisted.
    pub(crate) fn stable_snap(&mut self) {
        if let LogBuffer::Restoring { snapshot, entries } = self {
            *self = LogBuffer::Tail {
                offset: snapshot.meta.index + 1,
                entries: std::mem::take(entries),
            };
        }
    }

    /// Buffered entries up to and including `index` have been persisted.
    pub(crate) fn stable_to(&mut self, index: u64) {
        match self {
            LogBuffer::Tail { offset, entries } => {
                if index + 1 <= *offset {
                    return;
                }
                let n = (index + 1 - *offset) as usize;
                entries.drain(..n.min(entries.len()));
                *offset = index + 1;
            }
            LogBuffer::Restoring { .. } => {
                panic!("entries marked stable at {} while a snapshot is still pending", index);
            }
        }
    }
}
