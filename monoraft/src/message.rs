use std::fmt;

use crate::entry::Entry;
use crate::raft_types::NodeId;
use crate::storage::Snapshot;

/// The closed set of messages a node can step.
///
/// `Hup`, `Beat` and `Propose` are local: the driver steps them into its own
/// node and they never cross the wire, hence they carry no term.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum MessagePayload {
    /// Local: start an election.
    Hup,

    /// Local: broadcast a heartbeat round.
    Beat,

    /// Local: append entries to the leader's log.
    Propose { entries: Vec<Entry> },

    /// Replicate entries following `(prev_log_index, prev_log_term)`.
    AppendEntries {
        prev_log_index: u64,
        prev_log_term: u64,
        commit: u64,
        entries: Vec<Entry>,
    },

    /// Acknowledge or reject an `AppendEntries`.
    ///
    /// On acceptance `index` is the last index now present on the follower.
    /// On rejection `index` echoes `prev_log_index` and `reject_hint` carries
    /// the follower's last index so the leader can back off in one step.
    AppendEntriesResponse {
        index: u64,
        reject: bool,
        reject_hint: u64,
    },

    /// Ask for a vote, carrying the candidate's last log position.
    RequestVote { last_log_index: u64, last_log_term: u64 },

    /// Grant or reject a vote.
    RequestVoteResponse { reject: bool },

    /// Leader liveness probe carrying a commit index safe for the target.
    Heartbeat { commit: u64 },

    /// Acknowledge a `Heartbeat`.
    HeartbeatResponse,

    /// Install a snapshot replacing the follower's log prefix.
    Snapshot { snapshot: Snapshot },

    /// Ask the leader to hand leadership to the sender.
    TransferLeader,

    /// Leader-transfer rendezvous: campaign immediately, bypassing the
    /// randomized election timeout.
    TimeoutNow,
}

impl MessagePayload {
    /// A short tag for tracing.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            MessagePayload::Hup => "Hup",
            MessagePayload::Beat => "Beat",
            MessagePayload::Propose { .. } => "Propose",
            MessagePayload::AppendEntries { .. } => "AppendEntries",
            MessagePayload::AppendEntriesResponse { .. } => "AppendEntriesResponse",
            MessagePayload::RequestVote { .. } => "RequestVote",
            MessagePayload::RequestVoteResponse { .. } => "RequestVoteResponse",
            MessagePayload::Heartbeat { .. } => "Heartbeat",
            MessagePayload::HeartbeatResponse => "HeartbeatResponse",
            MessagePayload::Snapshot { .. } => "Snapshot",
            MessagePayload::TransferLeader => "TransferLeader",
            MessagePayload::TimeoutNow => "TimeoutNow",
        }
    }
}

/// A message between nodes, or from the driver to its own node.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Message {
    pub from: NodeId,
    pub to: NodeId,

    /// The sender's term at send time; `0` marks a local message.
    pub term: u64,

    pub payload: MessagePayload,
}

impl Message {
    pub fn new(from: NodeId, to: NodeId, term: u64, payload: MessagePayload) -> Self {
        Self { from, to, term, payload }
    }

    /// Build a local (term-less) message.
    pub fn local(from: NodeId, to: NodeId, payload: MessagePayload) -> Self {
        Self::new(from, to, 0, payload)
    }

    pub fn is_local(&self) -> bool {
        matches!(
            self.payload,
            MessagePayload::Hup | MessagePayload::Beat | MessagePayload::Propose { .. }
        )
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{} t{} {}", self.from, self.to, self.term, self.payload.kind())
    }
}
