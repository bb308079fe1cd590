//! The single logical log a node reasons about, bridging the durable
//! [`Storage`] prefix and the in-memory tail that has not been persisted yet.

use std::error::Error;

use validit::Validate;

use crate::entry::Entry;
use crate::error::StorageError;
use crate::storage::Snapshot;
use crate::storage::Storage;

mod log_buffer;

pub(crate) use log_buffer::LogBuffer;


/// The log state of one node.
///
/// Offset chain: `first_index - 1 <= applied <= committed <= last_index`.
/// Entries at indices below the buffer offset come from [`Storage`]; the rest
/// from the in-memory buffer.
#[derive(Debug)]
pub struct RaftLog<S: Storage> {
    /// The durable store, read-only from the core's point of view.
    pub store: S,

    committed: u64,
    applied: u64,
    buffer: LogBuffer,
}

impl<S: Storage> RaftLog<S> {
    pub fn new(store: S) -> RaftLog<S> {
        let first = store.first_index();
        let last = store.last_index();

        RaftLog {
            committed: first - 1,
            applied: first - 1,
            buffer: LogBuffer::new(last + 1),
            store,
        }
    }

    pub fn committed(&self) -> u64 {
        self.committed
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// The first index still present, i.e. one past the last snapshot.
    pub fn first_index(&self) -> u64 {
        match self.buffer.snapshot() {
            Some(snap) => snap.meta.index + 1,
            None => self.store.first_index(),
        }
    }

    /// The last index present, stable or not. With an empty log this reports
    /// the snapshot boundary.
    pub fn last_index(&self) -> u64 {
        self.buffer.last_index().unwrap_or_else(|| self.store.last_index())
    }

    /// The last index that is no longer buffered in memory. With a pending
    /// snapshot this is the snapshot boundary, which still awaits persistence.
    pub fn stabled(&self) -> u64 {
        self.buffer.offset() - 1
    }

    /// The term of the entry at `idx`.
    ///
    /// `idx` may also name the boundary `first_index - 1`, whose term is kept
    /// so the log-matching check works right after compaction.
    pub fn term(&self, idx: u64) -> Result<u64, StorageError> {
        if idx < self.first_index() - 1 {
            return Err(StorageError::Compacted);
        }
        if idx > self.last_index() {
            return Err(StorageError::Unavailable);
        }

        if let Some(t) = self.buffer.maybe_term(idx) {
            return Ok(t);
        }
        self.store.term(idx)
    }

    pub fn last_term(&self) -> u64 {
        zero_term_on_err(self.term(self.last_index()))
    }

    /// Entries in `[lo, last_index]`. An `lo` past the end yields an empty
    /// slice; an `lo` below `first_index` fails with `Compacted`.
    pub fn entries(&self, lo: u64) -> Result<Vec<Entry>, StorageError> {
        if lo > self.last_index() {
            return Ok(Vec::new());
        }
        self.slice(lo, self.last_index() + 1)
    }

    /// Entries in `[lo, hi)`, merged from the stable prefix and the buffer.
    pub fn slice(&self, lo: u64, hi: u64) -> Result<Vec<Entry>, StorageError> {
        if lo >= hi {
            return Ok(Vec::new());
        }
        if lo < self.first_index() {
            return Err(StorageError::Compacted);
        }
        if hi > self.last_index() + 1 {
            return Err(StorageError::Unavailable);
        }

        let offset = self.buffer.offset();
        let mut ents = Vec::with_capacity((hi - lo) as usize);

        if lo < offset {
            ents.extend(self.store.entries(lo, std::cmp::min(hi, offset))?);
        }
        if hi > offset {
            let buffered = self.buffer.entries();
            let start = (std::cmp::max(lo, offset) - offset) as usize;
            let end = (hi - offset) as usize;
            ents.extend_from_slice(&buffered[start..end]);
        }

        Ok(ents)
    }

    /// True iff the entry at `idx` exists and has term `t`.
    pub fn match_term(&self, idx: u64, t: u64) -> bool {
        self.term(idx).map(|term| term == t).unwrap_or(false)
    }

    /// The voter's up-to-date predicate: the candidate's last entry is in a
    /// later term, or in the same term at no smaller index.
    pub fn is_up_to_date(&self, last_index: u64, last_term: u64) -> bool {
        last_term > self.last_term()
            || (last_term == self.last_term() && last_index >= self.last_index())
    }

    /// Append the leader's entries after the matching prefix
    /// `(prev_log_index, prev_log_term)`, truncating any conflicting suffix,
    /// and advance the commit point. Returns the new last index on success,
    /// `None` if the prefix does not match.
    pub fn maybe_append(
        &mut self,
        prev_log_index: u64,
        prev_log_term: u64,
        commit: u64,
        ents: Vec<Entry>,
    ) -> Option<u64> {
        if !self.match_term(prev_log_index, prev_log_term) {
            return None;
        }

        let last_new_index = prev_log_index + ents.len() as u64;
        let conflict_at = self.find_conflict(&ents);
        match conflict_at {
            0 => {}
            _ if conflict_at <= self.committed => {
                panic!(
                    "entry {} conflicts with committed entry [committed({})]",
                    conflict_at, self.committed
                );
            }
            _ => {
                let start = (conflict_at - (prev_log_index + 1)) as usize;
                self.append(&ents[start..]);
            }
        }

        self.commit_to(std::cmp::min(commit, last_new_index));
        Some(last_new_index)
    }

    /// The first index whose term differs from the existing log, or 0 if the
    /// incoming entries are all already present.
    fn find_conflict(&self, ents: &[Entry]) -> u64 {
        for e in ents {
            if !self.match_term(e.index, e.term) {
                if e.index <= self.last_index() {
                    tracing::info!(
                        index = e.index,
                        existing_term = zero_term_on_err(self.term(e.index)),
                        entry_term = e.term,
                        "found conflict"
                    );
                }
                return e.index;
            }
        }
        0
    }

    /// Append entries that directly follow the current log (after any
    /// truncation the caller already decided on). Returns the new last index.
    pub fn append(&mut self, ents: &[Entry]) -> u64 {
        let first = match ents.first() {
            Some(e) => e.index,
            None => return self.last_index(),
        };

        if first - 1 < self.committed {
            panic!(
                "appending from {} would truncate below committed({})",
                first, self.committed
            );
        }
        if first > self.last_index() + 1 {
            panic!(
                "appending from {} leaves a gap after last_index({})",
                first,
                self.last_index()
            );
        }

        self.buffer.truncate_and_append(ents);
        self.last_index()
    }

    /// Advance `committed` to `max_index` only if that entry carries `term`.
    /// Counting replicas alone must never commit a prior-term entry.
    pub fn maybe_commit(&mut self, max_index: u64, term: u64) -> bool {
        if max_index > self.committed && zero_term_on_err(self.term(max_index)) == term {
            self.commit_to(max_index);
            return true;
        }
        false
    }

    /// Advance `committed`. A `to_commit` at or below the current value is a
    /// stale signal and is ignored; one past `last_index` is fatal.
    pub fn commit_to(&mut self, to_commit: u64) {
        if self.committed >= to_commit {
            return;
        }
        if to_commit > self.last_index() {
            panic!(
                "to_commit({}) is out of range [last_index({})]",
                to_commit,
                self.last_index()
            );
        }

        self.committed = to_commit;
        tracing::debug!(committed = self.committed, "advanced commit point");
    }

    /// Record that entries up to `idx` were delivered to the application.
    pub fn applied_to(&mut self, idx: u64) {
        if idx == 0 {
            return;
        }
        if idx > self.committed || idx < self.applied {
            panic!(
                "applied({}) is out of range [prev_applied({}), committed({})]",
                idx, self.applied, self.committed
            );
        }
        self.applied = idx;
    }

    /// Entries that must be persisted before responses are sent.
    pub fn unstable_entries(&self) -> &[Entry] {
        self.buffer.entries()
    }

    /// Committed entries not yet handed to the application: `(applied, committed]`.
    pub fn next_entries(&self) -> Vec<Entry> {
        let lo = std::cmp::max(self.applied + 1, self.first_index());
        if self.committed + 1 <= lo {
            return Vec::new();
        }
        match self.slice(lo, self.committed + 1) {
            Ok(ents) => ents,
            Err(e) => panic!("unexpected error getting unapplied entries: {}", e),
        }
    }

    pub fn has_next_entries(&self) -> bool {
        self.committed > self.applied
    }

    /// The snapshot waiting to be persisted and installed, if any.
    pub fn pending_snapshot(&self) -> Option<&Snapshot> {
        self.buffer.snapshot()
    }

    /// The snapshot to send to a peer that fell behind the first index.
    pub fn snapshot(&self) -> Result<Snapshot, StorageError> {
        if let Some(snap) = self.buffer.snapshot() {
            return Ok(snap.clone());
        }
        self.store.snapshot()
    }

    /// Discard the whole log in favor of a snapshot.
    pub fn restore(&mut self, snapshot: Snapshot) {
        tracing::info!(meta = %snapshot.meta, "log restores snapshot");

        let index = snapshot.meta.index;
        self.committed = index;
        self.applied = index;
        self.buffer.restore(snapshot);
    }

    pub(crate) fn stable_to(&mut self, index: u64) {
        self.buffer.stable_to(index);
    }

    pub(crate) fn stable_snap(&mut self) {
        self.buffer.stable_snap();
    }
}

impl<S: Storage> Validate for RaftLog<S> {
    fn validate(&self) -> Result<(), Box<dyn Error>> {
        validit::less_equal!(self.first_index() - 1, self.applied);
        validit::less_equal!(self.applied, self.committed);
        validit::less_equal!(self.committed, self.last_index());
        validit::less_equal!(self.buffer.offset() - 1, self.last_index());
        Ok(())
    }
}

/// Both range errors mean "no such entry", which reads as term 0.
fn zero_term_on_err(res: Result<u64, StorageError>) -> u64 {
    match res {
        Ok(t) => t,
        Err(StorageError::Compacted) | Err(StorageError::Unavailable) => 0,
        Err(e) => panic!("unexpected storage error: {}", e),
    }
}
