//! Membership changes and leadership transfer.

use crate::message::Message;
use crate::message::MessagePayload;
use crate::progress::Progress;
use crate::raft::Raft;
use crate::raft_types::NodeId;
use crate::raft_types::StateRole;
use crate::storage::Storage;

impl<S: Storage> Raft<S> {
    /// Add a voting member. Idempotent: adding a present node is a no-op.
    pub fn add_node(&mut self, id: NodeId) {
        if self.progress.contains_key(&id) {
            return;
        }

        let next_idx = self.raft_log.last_index() + 1;
        self.progress.insert(id, Progress::new(0, next_idx));
        tracing::info!(id = self.id, peer = id, "added node");
    }

    /// Remove a voting member. Removing an absent node is a no-op.
    pub fn remove_node(&mut self, id: NodeId) {
        self.progress.remove(&id);
        tracing::info!(id = self.id, peer = id, "removed node");

        if self.progress.is_empty() {
            return;
        }

        // The quorum shrank; entries may have become committable.
        if self.maybe_commit() {
            self.bcast_append();
        }

        if self.role == StateRole::Leader && self.lead_transferee == Some(id) {
            self.abort_leader_transfer();
        }
    }

    /// Leader side of a transfer request: `from` asks to take over.
    pub(crate) fn handle_transfer_leader(&mut self, from: NodeId) {
        if from == self.id {
            tracing::debug!(id = self.id, "already leader; ignored transfer to self");
            return;
        }

        if let Some(prev) = self.lead_transferee {
            if prev == from {
                tracing::info!(
                    id = self.id,
                    term = self.term,
                    transferee = from,
                    "transfer already in progress; ignored repeat request"
                );
                return;
            }
            self.abort_leader_transfer();
            tracing::info!(
                id = self.id,
                term = self.term,
                aborted = prev,
                "aborted previous leadership transfer"
            );
        }

        tracing::info!(id = self.id, term = self.term, transferee = from, "starting leadership transfer");
        // The transfer must finish within one election interval.
        self.election_elapsed = 0;
        self.lead_transferee = Some(from);

        if self.progress[&from].matched == self.raft_log.last_index() {
            tracing::info!(id = self.id, to = from, "transfer target is up to date; sent timeout-now");
            self.send_timeout_now(from);
        } else {
            self.send_append(from);
        }
    }

    pub(crate) fn send_timeout_now(&mut self, to: NodeId) {
        self.send(Message::new(self.id, to, 0, MessagePayload::TimeoutNow));
    }

    pub(crate) fn abort_leader_transfer(&mut self) {
        self.lead_transferee = None;
    }
}
