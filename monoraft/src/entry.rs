use std::fmt;

use crate::raft_types::NodeId;

/// The kind of a membership change.
#[derive(Debug, Clone, Copy)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ConfChangeType {
    /// Add a voting member. Adding a node that is already present is a no-op.
    AddNode,

    /// Remove a voting member. Removing an absent node is a no-op.
    RemoveNode,
}

/// A single-member membership change.
///
/// Only one change may be in the log but not yet applied at a time; a later
/// proposal is downgraded to an empty normal entry until the first is applied.
#[derive(Debug, Clone, Copy)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ConfChange {
    pub change_type: ConfChangeType,
    pub node_id: NodeId,
}

impl fmt::Display for ConfChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.change_type {
            ConfChangeType::AddNode => write!(f, "add_node({})", self.node_id),
            ConfChangeType::RemoveNode => write!(f, "remove_node({})", self.node_id),
        }
    }
}

/// The application data carried by an [`Entry`].
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum EntryPayload {
    /// An opaque application payload. An empty payload is the no-op a new
    /// leader appends to commit entries of earlier terms.
    Normal(Vec<u8>),

    /// A membership change.
    ConfChange(ConfChange),
}

impl EntryPayload {
    /// The no-op payload: an empty normal entry.
    pub fn noop() -> Self {
        EntryPayload::Normal(Vec::new())
    }

    pub fn is_conf_change(&self) -> bool {
        matches!(self, EntryPayload::ConfChange(_))
    }
}

impl Default for EntryPayload {
    fn default() -> Self {
        EntryPayload::noop()
    }
}

impl fmt::Display for EntryPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPayload::Normal(data) => write!(f, "normal({}B)", data.len()),
            EntryPayload::ConfChange(cc) => write!(f, "conf_change({})", cc),
        }
    }
}

/// A log entry.
///
/// Indices are dense and increase from 1; index 0 is the barrier before the
/// first entry (or the snapshot boundary after compaction).
#[derive(Debug, Clone, Default)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Entry {
    pub term: u64,
    pub index: u64,
    pub payload: EntryPayload,
}

impl Entry {
    /// Create an entry that has not been assigned a position in the log yet.
    /// The leader stamps `term` and `index` when appending.
    pub fn new(payload: EntryPayload) -> Self {
        Self {
            term: 0,
            index: 0,
            payload,
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}:{}", self.term, self.index, self.payload)
    }
}
