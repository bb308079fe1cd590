//! The AppendEntries and Heartbeat protocol, both sides.

use crate::entry::Entry;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::raft::Raft;
use crate::raft_types::NodeId;
use crate::storage::Storage;

impl<S: Storage> Raft<S> {
    /// Receiver side of AppendEntries.
    pub(crate) fn handle_append_entries(
        &mut self,
        from: NodeId,
        prev_log_index: u64,
        prev_log_term: u64,
        commit: u64,
        entries: Vec<Entry>,
    ) {
        if prev_log_index < self.raft_log.committed() {
            // The probe is below our commit point; answering with it lets the
            // leader jump its progress forward past the committed prefix.
            let index = self.raft_log.committed();
            self.send(Message::new(
                self.id,
                from,
                0,
                MessagePayload::AppendEntriesResponse {
                    index,
                    reject: false,
                    reject_hint: 0,
                },
            ));
            return;
        }

        match self.raft_log.maybe_append(prev_log_index, prev_log_term, commit, entries) {
            Some(last_index) => {
                self.send(Message::new(
                    self.id,
                    from,
                    0,
                    MessagePayload::AppendEntriesResponse {
                        index: last_index,
                        reject: false,
                        reject_hint: 0,
                    },
                ));
            }
            None => {
                tracing::debug!(
                    id = self.id,
                    term = self.term,
                    prev_log_index = prev_log_index,
                    prev_log_term = prev_log_term,
                    from = from,
                    "rejected append: no matching prefix"
                );
                let reject_hint = self.raft_log.last_index();
                self.send(Message::new(
                    self.id,
                    from,
                    0,
                    MessagePayload::AppendEntriesResponse {
                        index: prev_log_index,
                        reject: true,
                        reject_hint,
                    },
                ));
            }
        }
    }

    /// Receiver side of Heartbeat. The carried commit is clamped by the
    /// sender to what this node is known to hold.
    pub(crate) fn handle_heartbeat(&mut self, from: NodeId, commit: u64) {
        self.raft_log.commit_to(commit);
        self.send(Message::new(self.id, from, 0, MessagePayload::HeartbeatResponse));
    }

    /// Leader side: account a follower's response and react — back off and
    /// re-probe on rejection, or advance commit and possibly hand off
    /// leadership on success.
    pub(crate) fn handle_append_entries_response(
        &mut self,
        from: NodeId,
        index: u64,
        reject: bool,
        reject_hint: u64,
    ) {
        let pr = match self.progress.get_mut(&from) {
            Some(pr) => pr,
            None => return,
        };

        if reject {
            tracing::debug!(
                id = self.id,
                from = from,
                index = index,
                reject_hint = reject_hint,
                "received append rejection"
            );
            if pr.maybe_decr_to(index, reject_hint) {
                self.send_append(from);
            }
            return;
        }

        if !pr.maybe_update(index) {
            return;
        }
        let matched = pr.matched;

        if self.maybe_commit() {
            self.bcast_append();
        }

        // The transfer target caught up; tell it to take over now.
        if self.lead_transferee == Some(from) && matched == self.raft_log.last_index() {
            tracing::info!(id = self.id, to = from, "transfer target caught up; sent timeout-now");
            self.send_timeout_now(from);
        }
    }
}
