//! The contract between the consensus core and the durable log store.
//!
//! The core only ever *reads* through this trait; writes flow the other way,
//! through the [`Ready`](crate::raw_node::Ready) bundle that the driver
//! persists before calling [`RawNode::advance`](crate::raw_node::RawNode::advance).

use std::fmt;

use crate::entry::Entry;
use crate::error::StorageError;
use crate::raft_types::ConfState;
use crate::raft_types::HardState;

/// What a snapshot covers: the log prefix up to and including `index`, and
/// the membership at that point.
#[derive(Debug, Clone, Default)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SnapshotMeta {
    pub index: u64,
    pub term: u64,
    pub conf_state: ConfState,
}

impl fmt::Display for SnapshotMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{index:{}, term:{}, conf:{}}}", self.index, self.term, self.conf_state)
    }
}

/// A point-in-time image of the application state machine.
#[derive(Debug, Clone, Default)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Snapshot {
    /// Opaque application data.
    pub data: Vec<u8>,

    pub meta: SnapshotMeta,
}

impl Snapshot {
    /// A snapshot covering nothing carries no information.
    pub fn is_empty(&self) -> bool {
        self.meta.index == 0
    }
}

/// Read access to the durably stored prefix of the log.
///
/// Index conventions, shared with [`RaftLog`](crate::raft_log::RaftLog):
/// `first_index()` is the first retained entry (one past the last snapshot),
/// `last_index()` the last stored entry, and `term()` also answers for the
/// snapshot boundary `first_index() - 1`.
pub trait Storage {
    /// The persisted `HardState` and membership, consulted once at startup.
    fn initial_state(&self) -> (HardState, ConfState);

    /// Entries in `[lo, hi)`.
    ///
    /// Fails with [`StorageError::Compacted`] if `lo < first_index()`, and
    /// with [`StorageError::Unavailable`] if `hi > last_index() + 1`.
    fn entries(&self, lo: u64, hi: u64) -> Result<Vec<Entry>, StorageError>;

    /// The term of the entry at `idx`, valid for
    /// `idx ∈ [first_index() - 1, last_index()]`.
    fn term(&self, idx: u64) -> Result<u64, StorageError>;

    fn first_index(&self) -> u64;

    fn last_index(&self) -> u64;

    /// The most recent snapshot.
    ///
    /// May fail with [`StorageError::SnapshotTemporarilyUnavailable`] while a
    /// snapshot is being built; the core suppresses the send and retries.
    fn snapshot(&self) -> Result<Snapshot, StorageError>;
}
