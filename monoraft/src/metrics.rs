//! Observable node state, reported as a plain value.

use crate::raft_types::NodeId;
use crate::raft_types::StateRole;

/// A point-in-time snapshot of a node's observable state, produced by
/// [`RawNode::metrics`](crate::raw_node::RawNode::metrics).
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RaftMetrics {
    pub id: NodeId,
    pub role: StateRole,
    pub current_term: u64,
    pub vote: NodeId,
    pub leader_id: NodeId,
    pub first_index: u64,
    pub last_index: u64,
    pub committed: u64,
    pub applied: u64,
}
