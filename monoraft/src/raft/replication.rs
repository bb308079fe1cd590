//! Leader-side replication: sending entries and heartbeats, advancing the
//! commit point.

use crate::entry::Entry;
use crate::entry::EntryPayload;
use crate::error::Error;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::raft::Raft;
use crate::raft_types::NodeId;
use crate::storage::Storage;

impl<S: Storage> Raft<S> {
    /// A proposal reaching the leader. Conf changes are serialized: while one
    /// is in the log but unapplied, a later one is downgraded to a no-op.
    pub(crate) fn handle_propose(&mut self, mut entries: Vec<Entry>) -> Result<(), Error> {
        if entries.is_empty() {
            panic!("{} stepped an empty proposal", self.id);
        }
        if !self.progress.contains_key(&self.id) {
            // This node was removed from the membership while leading.
            return Err(Error::ProposalDropped);
        }
        if let Some(transferee) = self.lead_transferee {
            tracing::debug!(
                id = self.id,
                term = self.term,
                transferee = transferee,
                "leadership transfer in progress; dropping proposal"
            );
            return Err(Error::ProposalDropped);
        }

        for (i, e) in entries.iter_mut().enumerate() {
            if let EntryPayload::ConfChange(cc) = &e.payload {
                if self.pending_conf_index > self.raft_log.applied() {
                    tracing::info!(
                        conf_change = display(cc),
                        pending_conf_index = self.pending_conf_index,
                        applied = self.raft_log.applied(),
                        "conf change downgraded to no-op: another is pending"
                    );
                    e.payload = EntryPayload::noop();
                } else {
                    self.pending_conf_index = self.raft_log.last_index() + i as u64 + 1;
                }
            }
        }

        self.append_entry(entries);
        self.bcast_append();
        Ok(())
    }

    /// Stamp term and index on `ents`, append them, and account the leader's
    /// own progress. The caller broadcasts regardless of commit movement.
    pub(crate) fn append_entry(&mut self, mut ents: Vec<Entry>) {
        let last_index = self.raft_log.last_index();
        for (i, e) in ents.iter_mut().enumerate() {
            e.term = self.term;
            e.index = last_index + 1 + i as u64;
        }

        let last_index = self.raft_log.append(&ents);

        let self_id = self.id;
        if let Some(pr) = self.progress.get_mut(&self_id) {
            pr.maybe_update(last_index);
        }
        self.maybe_commit();
    }

    /// Send entries (or a snapshot, if the needed prefix is compacted) to one
    /// peer. Returns false if nothing could be sent this round.
    pub(crate) fn send_append(&mut self, to: NodeId) -> bool {
        let pr = match self.progress.get(&to) {
            Some(pr) => *pr,
            None => return false,
        };

        let prev_log_index = pr.next_idx - 1;
        let term_res = self.raft_log.term(prev_log_index);
        let ents_res = self.raft_log.entries(pr.next_idx);

        let (prev_log_term, entries) = match (term_res, ents_res) {
            (Ok(t), Ok(ents)) => (t, ents),
            _ => {
                // The prefix this follower needs is compacted away.
                return self.send_snapshot(to);
            }
        };

        let commit = self.raft_log.committed();
        self.send(Message::new(
            self.id,
            to,
            0,
            MessagePayload::AppendEntries {
                prev_log_index,
                prev_log_term,
                commit,
                entries,
            },
        ));
        true
    }

    pub(crate) fn bcast_append(&mut self) {
        let self_id = self.id;
        let peers: Vec<NodeId> = self.progress.keys().copied().filter(|&id| id != self_id).collect();
        for id in peers {
            self.send_append(id);
        }
    }

    /// A heartbeat carries `min(matched, committed)`: the follower must never
    /// be told to commit entries it may not have.
    pub(crate) fn send_heartbeat(&mut self, to: NodeId) {
        let matched = self.progress[&to].matched;
        let commit = std::cmp::min(matched, self.raft_log.committed());
        self.send(Message::new(self.id, to, 0, MessagePayload::Heartbeat { commit }));
    }

    pub(crate) fn bcast_heartbeat(&mut self) {
        let self_id = self.id;
        let peers: Vec<NodeId> = self.progress.keys().copied().filter(|&id| id != self_id).collect();
        for id in peers {
            self.send_heartbeat(id);
        }
    }

    /// Try to advance the commit point to the highest index replicated on a
    /// quorum. Returns whether it moved (the caller then broadcasts).
    pub(crate) fn maybe_commit(&mut self) -> bool {
        let mut matched: Vec<u64> = self.progress.values().map(|pr| pr.matched).collect();
        matched.sort_unstable_by(|a, b| b.cmp(a));
        let max_committable = matched[self.quorum() - 1];

        let term = self.term;
        self.raft_log.maybe_commit(max_committable, term)
    }
}
