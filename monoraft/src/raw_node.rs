//! The driver-facing façade: batches state-machine outputs into [`Ready`]
//! bundles and applies the driver's acknowledgement through [`RawNode::advance`].

use crate::config::Config;
use crate::entry::ConfChange;
use crate::entry::ConfChangeType;
use crate::entry::Entry;
use crate::entry::EntryPayload;
use crate::error::Error;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::metrics::RaftMetrics;
use crate::raft::Raft;
use crate::raft_types::ConfState;
use crate::raft_types::HardState;
use crate::raft_types::NodeId;
use crate::raft_types::SoftState;
use crate::storage::Snapshot;
use crate::storage::Storage;

/// One round of outputs for the driver.
///
/// Ordering contract:
/// 1. A leader may send `messages` concurrently with persisting `entries`;
///    followers only accept what passes the prev-index check, and uncommitted
///    leader entries can always be retried.
/// 2. A non-leader must persist `entries`, `snapshot` and `hard_state` before
///    sending `messages`, or it could acknowledge an entry it then loses on
///    restart.
/// 3. `committed_entries` may be applied in parallel with persisting later
///    entries.
#[derive(Debug, Default)]
pub struct Ready {
    soft_state: Option<SoftState>,
    hard_state: Option<HardState>,
    entries: Vec<Entry>,
    snapshot: Option<Snapshot>,
    committed_entries: Vec<Entry>,
    messages: Vec<Message>,

    // Recorded at creation, so `advance` still knows what this bundle
    // covered after the driver drained the vectors with `take_*`.
    last_entry_index: Option<u64>,
    last_committed_index: Option<u64>,
}

impl Ready {
    /// Present iff the leader or this node's role changed.
    pub fn soft_state(&self) -> Option<&SoftState> {
        self.soft_state.as_ref()
    }

    /// Present iff term, vote or commit changed; persist before sending.
    pub fn hard_state(&self) -> Option<&HardState> {
        self.hard_state.as_ref()
    }

    /// Entries to persist to the stable log.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// A snapshot to persist and hand to the application, if one arrived.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Committed entries ready for the application, in order.
    pub fn committed_entries(&self) -> &[Entry] {
        &self.committed_entries
    }

    /// Outbound messages for the transport.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn take_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }

    pub fn take_committed_entries(&mut self) -> Vec<Entry> {
        std::mem::take(&mut self.committed_entries)
    }
}

/// A thin wrapper over [`Raft`] driving the Ready/Advance protocol.
pub struct RawNode<S: Storage> {
    pub raft: Raft<S>,
    prev_soft_state: SoftState,
    prev_hard_state: HardState,
}

impl<S: Storage> RawNode<S> {
    pub fn new(config: &Config, store: S) -> Result<RawNode<S>, Error> {
        let raft = Raft::new(config, store)?;

        // Deltas are computed against what the store already holds, so
        // anything the node did during construction (a single-voter
        // self-election, say) lands in the first Ready.
        let (prev_hard_state, _) = raft.raft_log.store.initial_state();

        Ok(RawNode {
            raft,
            prev_soft_state: SoftState::default(),
            prev_hard_state,
        })
    }

    /// Advance the logical clock; see [`Config::election_tick`].
    pub fn tick(&mut self) {
        self.raft.tick();
    }

    /// Step a message from the transport (or a forwarded admin request).
    pub fn step(&mut self, m: Message) -> Result<(), Error> {
        self.raft.step(m)
    }

    /// Force an election.
    pub fn campaign(&mut self) -> Result<(), Error> {
        let id = self.raft.id;
        self.raft.step(Message::local(id, id, MessagePayload::Hup))
    }

    /// Propose one opaque application payload.
    pub fn propose(&mut self, data: Vec<u8>) -> Result<(), Error> {
        let id = self.raft.id;
        self.raft.step(Message::local(
            id,
            id,
            MessagePayload::Propose {
                entries: vec![Entry::new(EntryPayload::Normal(data))],
            },
        ))
    }

    /// Propose a membership change.
    pub fn propose_conf_change(&mut self, cc: ConfChange) -> Result<(), Error> {
        let id = self.raft.id;
        self.raft.step(Message::local(
            id,
            id,
            MessagePayload::Propose {
                entries: vec![Entry::new(EntryPayload::ConfChange(cc))],
            },
        ))
    }

    /// Ask the leader to hand leadership to `transferee`. The request is
    /// stepped as if it came from the transferee and is forwarded if this
    /// node is not the leader.
    pub fn transfer_leader(&mut self, transferee: NodeId) -> Result<(), Error> {
        let id = self.raft.id;
        self.raft.step(Message::local(transferee, id, MessagePayload::TransferLeader))
    }

    /// Called by the driver after a ConfChange entry has been applied by the
    /// application. Returns the membership to persist.
    pub fn apply_conf_change(&mut self, cc: &ConfChange) -> ConfState {
        match cc.change_type {
            ConfChangeType::AddNode => self.raft.add_node(cc.node_id),
            ConfChangeType::RemoveNode => self.raft.remove_node(cc.node_id),
        }
        ConfState::new(self.raft.progress.keys().copied().collect())
    }

    /// Whether a call to [`RawNode::ready`] would return a non-empty bundle.
    pub fn has_ready(&self) -> bool {
        let raft = &self.raft;

        if !raft.msgs.is_empty() {
            return true;
        }
        if raft.soft_state() != self.prev_soft_state {
            return true;
        }
        let hs = raft.hard_state();
        if !hs.is_empty() && hs != self.prev_hard_state {
            return true;
        }
        if raft.raft_log.pending_snapshot().is_some() {
            return true;
        }
        if !raft.raft_log.unstable_entries().is_empty() {
            return true;
        }
        if raft.raft_log.has_next_entries() {
            return true;
        }
        false
    }

    /// Collect the current outputs. The driver persists and sends them, then
    /// acknowledges with [`RawNode::advance`].
    pub fn ready(&mut self) -> Ready {
        let raft = &mut self.raft;

        let soft_state = {
            let ss = raft.soft_state();
            (ss != self.prev_soft_state).then_some(ss)
        };
        let hard_state = {
            let hs = raft.hard_state();
            (!hs.is_empty() && hs != self.prev_hard_state).then_some(hs)
        };

        let entries = raft.raft_log.unstable_entries().to_vec();
        let committed_entries = raft.raft_log.next_entries();

        Ready {
            soft_state,
            hard_state,
            last_entry_index: entries.last().map(|e| e.index),
            last_committed_index: committed_entries.last().map(|e| e.index),
            entries,
            snapshot: raft.raft_log.pending_snapshot().cloned(),
            committed_entries,
            messages: raft.take_messages(),
        }
    }

    /// Commit a Ready bundle: entries in it are now stable, committed entries
    /// are consumed, and any pending snapshot is installed.
    pub fn advance(&mut self, ready: Ready) {
        if let Some(ss) = ready.soft_state {
            self.prev_soft_state = ss;
        }
        if let Some(hs) = ready.hard_state {
            self.prev_hard_state = hs;
        }

        // Snapshot first: entries in the same bundle sit above its boundary.
        if ready.snapshot.is_some() {
            self.raft.raft_log.stable_snap();
        }
        if let Some(index) = ready.last_entry_index {
            self.raft.raft_log.stable_to(index);
        }
        if let Some(index) = ready.last_committed_index {
            self.raft.raft_log.applied_to(index);
        }
    }

    /// A snapshot of the observable state.
    pub fn metrics(&self) -> RaftMetrics {
        RaftMetrics {
            id: self.raft.id,
            role: self.raft.role,
            current_term: self.raft.term,
            vote: self.raft.vote,
            leader_id: self.raft.leader_id,
            first_index: self.raft.raft_log.first_index(),
            last_index: self.raft.raft_log.last_index(),
            committed: self.raft.raft_log.committed(),
            applied: self.raft.raft_log.applied(),
        }
    }
}
