//! The snapshot protocol: shipping a compacted prefix to a lagging peer and
//! restoring from a received snapshot.

use crate::error::StorageError;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::progress::Progress;
use crate::raft::Raft;
use crate::raft_types::NodeId;
use crate::storage::Snapshot;
use crate::storage::Storage;

impl<S: Storage> Raft<S> {
    /// Ship the current snapshot to `to`, because the entries it needs are
    /// compacted. Returns false if the snapshot is still being built.
    pub(crate) fn send_snapshot(&mut self, to: NodeId) -> bool {
        let snapshot = match self.raft_log.snapshot() {
            Ok(s) => s,
            Err(StorageError::SnapshotTemporarilyUnavailable) => {
                tracing::debug!(
                    id = self.id,
                    to = to,
                    "snapshot temporarily unavailable; retrying next round"
                );
                return false;
            }
            Err(e) => panic!("unexpected error loading snapshot: {}", e),
        };
        if snapshot.is_empty() {
            panic!("need a non-empty snapshot to send");
        }

        tracing::debug!(
            id = self.id,
            to = to,
            first_index = self.raft_log.first_index(),
            commit = self.raft_log.committed(),
            snapshot_index = snapshot.meta.index,
            snapshot_term = snapshot.meta.term,
            "sent snapshot"
        );
        self.send(Message::new(self.id, to, 0, MessagePayload::Snapshot { snapshot }));
        true
    }

    /// Receiver side. A stale snapshot is answered with the current commit
    /// point so the sender's progress can move past it.
    pub(crate) fn handle_snapshot(&mut self, from: NodeId, snapshot: Snapshot) {
        let index = snapshot.meta.index;
        let term = snapshot.meta.term;

        if self.restore(snapshot) {
            tracing::info!(
                id = self.id,
                commit = self.raft_log.committed(),
                snapshot_index = index,
                snapshot_term = term,
                "restored snapshot"
            );
            let last_index = self.raft_log.last_index();
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
        } else {
            tracing::info!(
                id = self.id,
                commit = self.raft_log.committed(),
                snapshot_index = index,
                snapshot_term = term,
                "ignored snapshot"
            );
            let committed = self.raft_log.committed();
            self.send(Message::new(
                self.id,
                from,
                0,
                MessagePayload::AppendEntriesResponse {
                    index: committed,
                    reject: false,
                    reject_hint: 0,
                },
            ));
        }
    }

    /// Reset log and membership from a snapshot. Returns false for a stale
    /// snapshot, or when the log already holds the snapshot's last entry (the
    /// fast-forward case: only the commit point moves).
    fn restore(&mut self, snapshot: Snapshot) -> bool {
        if snapshot.meta.index <= self.raft_log.committed() {
            return false;
        }
        if self.raft_log.match_term(snapshot.meta.index, snapshot.meta.term) {
            tracing::info!(
                id = self.id,
                commit = self.raft_log.committed(),
                last_index = self.raft_log.last_index(),
                snapshot_index = snapshot.meta.index,
                "fast-forwarded commit to snapshot boundary"
            );
            self.raft_log.commit_to(snapshot.meta.index);
            return false;
        }

        let nodes = snapshot.meta.conf_state.nodes.clone();
        self.raft_log.restore(snapshot);

        self.progress.clear();
        let last_index = self.raft_log.last_index();
        let self_id = self.id;
        for id in nodes {
            let matched = if id == self_id { last_index } else { 0 };
            self.progress.insert(id, Progress::new(matched, last_index + 1));
            tracing::info!(id = self_id, peer = id, "restored progress from snapshot membership");
        }
        true
    }
}
