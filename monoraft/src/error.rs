//! Error taxonomy of the consensus core.
//!
//! Transient and protocol conditions are absorbed or surfaced as recoverable
//! errors; invariant violations (regressing `committed` or `applied`,
//! truncating below the commit point, appending out of order) panic instead,
//! because continuing past corrupted state is worse than crashing.

use anyerror::AnyError;

use crate::config::ConfigError;

/// Errors raised by a [`Storage`](crate::storage::Storage) implementation.
#[derive(Debug, Clone, thiserror::Error)]
#[derive(PartialEq, Eq)]
pub enum StorageError {
    /// The requested index is below the first retained index; the prefix was
    /// replaced by a snapshot.
    #[error("requested entry at index is compacted")]
    Compacted,

    /// The requested index is past the last known index.
    #[error("requested entry at index is unavailable")]
    Unavailable,

    /// The snapshot is being built; the caller retries next round.
    #[error("snapshot is temporarily unavailable")]
    SnapshotTemporarilyUnavailable,

    /// The store itself failed.
    #[error("storage io error: {0}")]
    Io(AnyError),
}

/// Errors returned to the driver by the consensus core.
#[derive(Debug, Clone, thiserror::Error)]
#[derive(PartialEq, Eq)]
pub enum Error {
    /// A proposal cannot be accepted right now: this node is not the leader,
    /// a leadership transfer is in flight, or this node was removed from the
    /// membership. The caller may retry or surface the rejection.
    #[error("raft proposal dropped")]
    ProposalDropped,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
