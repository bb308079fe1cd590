//! Campaigning and vote handling.

use crate::message::Message;
use crate::message::MessagePayload;
use crate::raft::Raft;
use crate::raft_types::NodeId;
use crate::raft_types::StateRole;
use crate::raft_types::INVALID_ID;
use crate::storage::Storage;

impl<S: Storage> Raft<S> {
    /// A local `Hup`: start an election unless already leading or blocked by
    /// a committed-but-unapplied conf change.
    pub(crate) fn hup(&mut self) {
        if self.role == StateRole::Leader {
            tracing::debug!(id = self.id, "ignoring election request: already leader");
            return;
        }
        if !self.promotable() {
            tracing::warn!(id = self.id, "cannot campaign: not a voting member");
            return;
        }

        // A conf change sitting in (applied, committed] will change the voter
        // set once applied; it must take effect before a new campaign.
        let ents = self
            .raft_log
            .slice(self.raft_log.applied() + 1, self.raft_log.committed() + 1)
            .unwrap_or_else(|e| panic!("unexpected error getting unapplied entries: {}", e));
        let pending = ents.iter().filter(|e| e.payload.is_conf_change()).count();
        if pending != 0 && self.raft_log.committed() > self.raft_log.applied() {
            tracing::warn!(
                id = self.id,
                term = self.term,
                pending = pending,
                "cannot campaign: unapplied conf changes"
            );
            return;
        }

        tracing::info!(id = self.id, term = self.term, "starting a new election");
        self.campaign();
    }

    /// Move to candidate and solicit votes. Wins on the spot in a group of
    /// one.
    pub(crate) fn campaign(&mut self) {
        self.become_candidate();

        let self_id = self.id;
        if self.poll(self_id, true) >= self.quorum() {
            self.become_leader();
            return;
        }

        let term = self.term;
        let last_log_index = self.raft_log.last_index();
        let last_log_term = self.raft_log.last_term();
        let peers: Vec<NodeId> = self.progress.keys().copied().filter(|&id| id != self_id).collect();
        for id in peers {
            tracing::info!(
                id = self_id,
                term = term,
                to = id,
                last_log_index = last_log_index,
                last_log_term = last_log_term,
                "sent vote request"
            );
            self.send(Message::new(
                self_id,
                id,
                term,
                MessagePayload::RequestVote {
                    last_log_index,
                    last_log_term,
                },
            ));
        }
    }

    /// Record a vote and return the number of grants so far. Only the first
    /// response per voter counts.
    pub(crate) fn poll(&mut self, id: NodeId, granted: bool) -> usize {
        tracing::info!(
            id = self.id,
            term = self.term,
            from = id,
            granted = granted,
            "received vote"
        );

        self.votes.entry(id).or_insert(granted);
        self.votes.values().filter(|&&v| v).count()
    }

    /// Handle a vote request, in any role; term gating already ran.
    ///
    /// Grant iff no vote was cast this term (or it was cast for this very
    /// candidate) and the candidate's log is at least as up to date.
    pub(crate) fn handle_request_vote(
        &mut self,
        from: NodeId,
        msg_term: u64,
        last_log_index: u64,
        last_log_term: u64,
    ) {
        let can_vote = self.vote == from || self.vote == INVALID_ID;

        if can_vote && self.raft_log.is_up_to_date(last_log_index, last_log_term) {
            tracing::info!(
                id = self.id,
                term = self.term,
                to = from,
                last_log_index = last_log_index,
                last_log_term = last_log_term,
                "cast vote"
            );
            // The response carries the term the vote was requested in.
            self.send(Message::new(
                self.id,
                from,
                msg_term,
                MessagePayload::RequestVoteResponse { reject: false },
            ));
            self.election_elapsed = 0;
            self.vote = from;
        } else {
            tracing::info!(
                id = self.id,
                term = self.term,
                vote = self.vote,
                to = from,
                last_log_index = last_log_index,
                last_log_term = last_log_term,
                "rejected vote request"
            );
            let term = self.term;
            self.send(Message::new(
                self.id,
                from,
                term,
                MessagePayload::RequestVoteResponse { reject: true },
            ));
        }
    }
}
