use std::fmt;

/// A Raft node's ID.
pub type NodeId = u64;

/// The reserved node id; it means "no node", e.g., no leader is known.
pub const INVALID_ID: NodeId = 0;

/// The role a node plays in its group.
#[derive(Debug, Clone, Copy, Default)]
#[derive(PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StateRole {
    /// The node is replicating the log from the leader.
    #[default]
    Follower,

    /// The node is campaigning for leadership.
    Candidate,

    /// The node is the group leader.
    Leader,
}

impl fmt::Display for StateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The state that must be durable before any message depending on it is sent.
#[derive(Debug, Clone, Default)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct HardState {
    /// The last term this node has seen.
    pub term: u64,

    /// The node this node voted for in `term`, or [`INVALID_ID`].
    pub vote: NodeId,

    /// The highest log index known to be committed.
    pub commit: u64,
}

impl HardState {
    /// A hard state that has never been written is indistinguishable from the default.
    pub fn is_empty(&self) -> bool {
        *self == HardState::default()
    }
}

impl fmt::Display for HardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{term:{}, vote:{}, commit:{}}}", self.term, self.vote, self.commit)
    }
}

/// Volatile state reported for observability only.
#[derive(Debug, Clone, Copy, Default)]
#[derive(PartialEq, Eq)]
pub struct SoftState {
    /// The current leader, or [`INVALID_ID`] if none is known.
    pub leader_id: NodeId,

    /// This node's role.
    pub role: StateRole,
}

/// The membership of the group: the ids of all voting members.
#[derive(Debug, Clone, Default)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ConfState {
    /// Ids of all voters, in ascending order.
    pub nodes: Vec<NodeId>,
}

impl ConfState {
    pub fn new(mut nodes: Vec<NodeId>) -> Self {
        nodes.sort_unstable();
        nodes.dedup();
        Self { nodes }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }
}

impl fmt::Display for ConfState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{nodes:{:?}}}", self.nodes)
    }
}
