//! The Raft state machine: a deterministic, I/O-free core that consumes
//! messages and tick signals and produces outbound messages and log updates.
//!
//! All outputs land in the internal message buffer and the log's unstable
//! tail; the [`RawNode`](crate::raw_node::RawNode) façade batches them into
//! Ready bundles for the driver.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use validit::Valid;

use crate::config::Config;
use crate::display_ext::DisplayOptionExt;
use crate::entry::Entry;
use crate::entry::EntryPayload;
use crate::error::Error;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::progress::Progress;
use crate::raft_log::RaftLog;
use crate::raft_types::HardState;
use crate::raft_types::NodeId;
use crate::raft_types::SoftState;
use crate::raft_types::StateRole;
use crate::raft_types::INVALID_ID;
use crate::storage::Storage;

mod admin;
mod append_entries;
mod install_snapshot;
mod replication;
mod vote;

#[cfg(test)]
pub(crate) mod tests {
    mod elect_test;
    mod membership_test;
    mod replication_test;
    mod snapshot_test;
    mod transfer_test;

    pub(crate) mod fixtures;
}

/// A single Raft peer.
pub struct Raft<S: Storage> {
    pub id: NodeId,

    pub term: u64,

    /// Who this node voted for in `term`, or [`INVALID_ID`].
    pub vote: NodeId,

    pub raft_log: Valid<RaftLog<S>>,

    /// Per-peer replication progress; meaningful only while leader.
    pub progress: BTreeMap<NodeId, Progress>,

    pub role: StateRole,

    /// The known leader of `term`, or [`INVALID_ID`].
    pub leader_id: NodeId,

    /// Highest index of a conf change that is in the log but possibly not yet
    /// applied. Proposing another one before `applied` passes it is refused.
    pub pending_conf_index: u64,

    /// The target of an in-flight leadership transfer.
    pub(crate) lead_transferee: Option<NodeId>,

    /// Votes received while campaigning; the first response per voter wins.
    pub(crate) votes: BTreeMap<NodeId, bool>,

    /// Outbound messages, drained by the driver through a Ready bundle.
    pub(crate) msgs: Vec<Message>,

    pub(crate) election_timeout: usize,
    pub(crate) heartbeat_timeout: usize,

    /// Re-drawn from `[election_timeout, 2 * election_timeout - 1]` on every
    /// timer reset.
    pub(crate) randomized_election_timeout: usize,

    pub(crate) election_elapsed: usize,
    pub(crate) heartbeat_elapsed: usize,

    rng: StdRng,
}

impl<S: Storage> Raft<S> {
    /// Build a node from its config and durable state.
    ///
    /// The node starts as a follower at the stored term. A group of one
    /// elects itself immediately; there is no peer to wait for.
    pub fn new(config: &Config, store: S) -> Result<Raft<S>, Error> {
        config.validate()?;

        let raft_log = RaftLog::new(store);
        let (hard_state, conf_state) = raft_log.store.initial_state();

        let mut peers: &[NodeId] = &config.peers;
        if !conf_state.nodes.is_empty() {
            if !peers.is_empty() {
                panic!("cannot specify both bootstrap peers and a stored ConfState");
            }
            peers = &conf_state.nodes;
        }

        let mut r = Raft {
            id: config.id,
            term: 0,
            vote: INVALID_ID,
            raft_log: Valid::new(raft_log),
            progress: peers.iter().map(|&id| (id, Progress::new(0, 1))).collect(),
            role: StateRole::Follower,
            leader_id: INVALID_ID,
            pending_conf_index: 0,
            lead_transferee: None,
            votes: BTreeMap::new(),
            msgs: Vec::new(),
            election_timeout: config.election_tick,
            heartbeat_timeout: config.heartbeat_tick,
            randomized_election_timeout: 0,
            election_elapsed: 0,
            heartbeat_elapsed: 0,
            rng: StdRng::from_entropy(),
        };

        if !hard_state.is_empty() {
            r.load_state(&hard_state);
        }
        if config.applied > 0 {
            r.raft_log.applied_to(config.applied);
        }

        let term = r.term;
        r.become_follower(term, INVALID_ID);

        tracing::info!(
            id = r.id,
            term = r.term,
            commit = r.raft_log.committed(),
            applied = r.raft_log.applied(),
            last_index = r.raft_log.last_index(),
            last_term = r.raft_log.last_term(),
            peers = debug(r.progress.keys().collect::<Vec<_>>()),
            "new raft node"
        );

        if r.progress.len() == 1 && r.promotable() {
            r.hup();
        }

        Ok(r)
    }

    fn load_state(&mut self, hs: &HardState) {
        if hs.commit < self.raft_log.committed() || hs.commit > self.raft_log.last_index() {
            panic!(
                "hard state commit {} is out of range [{}, {}]",
                hs.commit,
                self.raft_log.committed(),
                self.raft_log.last_index()
            );
        }

        self.raft_log.commit_to(hs.commit);
        self.term = hs.term;
        self.vote = hs.vote;
    }

    pub fn soft_state(&self) -> SoftState {
        SoftState {
            leader_id: self.leader_id,
            role: self.role,
        }
    }

    pub fn hard_state(&self) -> HardState {
        HardState {
            term: self.term,
            vote: self.vote,
            commit: self.raft_log.committed(),
        }
    }

    /// A majority of the current voter set.
    pub(crate) fn quorum(&self) -> usize {
        self.progress.len() / 2 + 1
    }

    /// Whether this node may campaign: it must itself be a voting member.
    pub fn promotable(&self) -> bool {
        self.progress.contains_key(&self.id)
    }

    /// Stamp sender and term, then queue the message for the driver.
    ///
    /// Vote requests and responses carry the term they were cast in, set by
    /// the caller; every other message takes the current term here.
    pub(crate) fn send(&mut self, mut m: Message) {
        m.from = self.id;
        match m.payload {
            MessagePayload::RequestVote { .. } | MessagePayload::RequestVoteResponse { .. } => {
                assert_ne!(
                    0,
                    m.term,
                    "term must be set when sending {}",
                    m.payload.kind()
                );
            }
            _ => {
                assert_eq!(
                    0,
                    m.term,
                    "term must not be pre-set when sending {}",
                    m.payload.kind()
                );
                m.term = self.term;
            }
        }
        self.msgs.push(m);
    }

    pub(crate) fn take_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.msgs)
    }

    fn reset(&mut self, term: u64) {
        if self.term != term {
            self.term = term;
            self.vote = INVALID_ID;
        }
        self.leader_id = INVALID_ID;

        self.election_elapsed = 0;
        self.heartbeat_elapsed = 0;
        self.reset_randomized_election_timeout();

        self.abort_leader_transfer();

        self.votes.clear();

        let last_index = self.raft_log.last_index();
        let self_id = self.id;
        for (&id, pr) in self.progress.iter_mut() {
            *pr = Progress::new(if id == self_id { last_index } else { 0 }, last_index + 1);
        }

        self.pending_conf_index = 0;
    }

    pub(crate) fn become_follower(&mut self, term: u64, leader_id: NodeId) {
        self.reset(term);
        self.leader_id = leader_id;
        self.role = StateRole::Follower;
        tracing::info!(id = self.id, term = self.term, leader_id = leader_id, "became follower");
    }

    pub(crate) fn become_candidate(&mut self) {
        assert_ne!(
            StateRole::Leader,
            self.role,
            "invalid transition [leader -> candidate]"
        );

        let term = self.term + 1;
        self.reset(term);
        self.vote = self.id;
        self.role = StateRole::Candidate;
        tracing::info!(id = self.id, term = self.term, "became candidate");
    }

    pub(crate) fn become_leader(&mut self) {
        assert_eq!(
            StateRole::Candidate,
            self.role,
            "invalid transition [follower -> leader]"
        );

        let term = self.term;
        self.reset(term);
        self.leader_id = self.id;
        self.role = StateRole::Leader;

        // There may or may not be a pending conf change somewhere in the
        // tail; holding new ones until everything current is applied is
        // always safe and avoids scanning the log.
        self.pending_conf_index = self.raft_log.last_index();

        // The no-op makes entries of earlier terms committable under the
        // current-term commit rule.
        self.append_entry(vec![Entry::new(EntryPayload::noop())]);
        tracing::info!(id = self.id, term = self.term, "became leader");
    }

    /// Advance the logical clock by one tick.
    pub fn tick(&mut self) {
        match self.role {
            StateRole::Follower | StateRole::Candidate => self.tick_election(),
            StateRole::Leader => self.tick_heartbeat(),
        }
    }

    fn tick_election(&mut self) {
        self.election_elapsed += 1;

        if self.promotable() && self.election_elapsed >= self.randomized_election_timeout {
            self.election_elapsed = 0;
            let m = Message::local(self.id, self.id, MessagePayload::Hup);
            let _ = self.step(m);
        }
    }

    fn tick_heartbeat(&mut self) {
        self.heartbeat_elapsed += 1;
        self.election_elapsed += 1;

        if self.election_elapsed >= self.election_timeout {
            self.election_elapsed = 0;
            // A transfer must complete within one election interval.
            if self.lead_transferee.is_some() {
                tracing::info!(
                    id = self.id,
                    transferee = display(self.lead_transferee.display()),
                    "leadership transfer timed out; aborted"
                );
                self.abort_leader_transfer();
            }
        }

        if self.role != StateRole::Leader {
            return;
        }

        if self.heartbeat_elapsed >= self.heartbeat_timeout {
            self.heartbeat_elapsed = 0;
            let m = Message::local(self.id, self.id, MessagePayload::Beat);
            let _ = self.step(m);
        }
    }

    /// The entrance for every message, local or from the wire.
    pub fn step(&mut self, m: Message) -> Result<(), Error> {
        if m.term == 0 {
            // Local message; no term logic applies.
        } else if m.term > self.term {
            tracing::info!(
                id = self.id,
                term = self.term,
                from = m.from,
                msg_term = m.term,
                kind = m.payload.kind(),
                "received a message with higher term"
            );
            let leader_id = match m.payload {
                MessagePayload::AppendEntries { .. }
                | MessagePayload::Heartbeat { .. }
                | MessagePayload::Snapshot { .. } => m.from,
                _ => INVALID_ID,
            };
            self.become_follower(m.term, leader_id);
        } else if m.term < self.term {
            tracing::debug!(
                id = self.id,
                term = self.term,
                from = m.from,
                msg_term = m.term,
                kind = m.payload.kind(),
                "ignored a message with lower term"
            );
            return Ok(());
        }

        match m.payload {
            MessagePayload::Hup => {
                self.hup();
                Ok(())
            }
            MessagePayload::RequestVote {
                last_log_index,
                last_log_term,
            } => {
                self.handle_request_vote(m.from, m.term, last_log_index, last_log_term);
                Ok(())
            }
            _ => match self.role {
                StateRole::Follower => self.step_follower(m),
                StateRole::Candidate => self.step_candidate(m),
                StateRole::Leader => self.step_leader(m),
            },
        }
    }

    fn step_follower(&mut self, m: Message) -> Result<(), Error> {
        let from = m.from;
        match m.payload {
            MessagePayload::Propose { .. } => {
                tracing::info!(id = self.id, term = self.term, "no leader; dropping proposal");
                Err(Error::ProposalDropped)
            }
            MessagePayload::AppendEntries {
                prev_log_index,
                prev_log_term,
                commit,
                entries,
            } => {
                self.election_elapsed = 0;
                self.leader_id = from;
                self.handle_append_entries(from, prev_log_index, prev_log_term, commit, entries);
                Ok(())
            }
            MessagePayload::Heartbeat { commit } => {
                self.election_elapsed = 0;
                self.leader_id = from;
                self.handle_heartbeat(from, commit);
                Ok(())
            }
            MessagePayload::Snapshot { snapshot } => {
                self.election_elapsed = 0;
                self.leader_id = from;
                self.handle_snapshot(from, snapshot);
                Ok(())
            }
            MessagePayload::TransferLeader => {
                if self.leader_id == INVALID_ID {
                    tracing::info!(
                        id = self.id,
                        term = self.term,
                        "no leader; dropping leader transfer request"
                    );
                    return Ok(());
                }
                let mut fwd = m;
                fwd.to = self.leader_id;
                // Forwarding is local routing; the term is stamped on send.
                fwd.term = 0;
                self.send(fwd);
                Ok(())
            }
            MessagePayload::TimeoutNow => {
                if self.promotable() {
                    tracing::info!(
                        id = self.id,
                        term = self.term,
                        from = from,
                        "received a timeout-now; campaigning to take leadership"
                    );
                    self.campaign();
                } else {
                    tracing::info!(
                        id = self.id,
                        from = from,
                        "received a timeout-now but is not a voting member"
                    );
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn step_candidate(&mut self, m: Message) -> Result<(), Error> {
        let from = m.from;
        let term = m.term;
        match m.payload {
            MessagePayload::Propose { .. } => {
                tracing::info!(id = self.id, term = self.term, "no leader; dropping proposal");
                Err(Error::ProposalDropped)
            }
            // An equal-term replication message means another candidate won
            // this term: yield and adopt the sender as leader.
            MessagePayload::AppendEntries {
                prev_log_index,
                prev_log_term,
                commit,
                entries,
            } => {
                self.become_follower(term, from);
                self.handle_append_entries(from, prev_log_index, prev_log_term, commit, entries);
                Ok(())
            }
            MessagePayload::Heartbeat { commit } => {
                self.become_follower(term, from);
                self.handle_heartbeat(from, commit);
                Ok(())
            }
            MessagePayload::Snapshot { snapshot } => {
                self.become_follower(term, from);
                self.handle_snapshot(from, snapshot);
                Ok(())
            }
            MessagePayload::RequestVoteResponse { reject } => {
                let granted = self.poll(from, !reject);
                let rejected = self.votes.len() - granted;
                tracing::info!(
                    id = self.id,
                    term = self.term,
                    granted = granted,
                    rejected = rejected,
                    quorum = self.quorum(),
                    "vote tallied"
                );

                if granted >= self.quorum() {
                    self.become_leader();
                    self.bcast_append();
                } else if rejected >= self.quorum() {
                    let term = self.term;
                    self.become_follower(term, INVALID_ID);
                }
                Ok(())
            }
            MessagePayload::TimeoutNow => {
                tracing::debug!(
                    id = self.id,
                    term = self.term,
                    from = from,
                    "ignored a timeout-now while campaigning"
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn step_leader(&mut self, m: Message) -> Result<(), Error> {
        let from = m.from;
        match m.payload {
            MessagePayload::Beat => {
                self.bcast_heartbeat();
                Ok(())
            }
            MessagePayload::Propose { entries } => self.handle_propose(entries),
            payload => {
                // Everything else is peer feedback; a sender outside the
                // membership has no progress to account against.
                if !self.progress.contains_key(&from) {
                    tracing::debug!(id = self.id, from = from, "no progress available");
                    return Ok(());
                }

                match payload {
                    MessagePayload::AppendEntriesResponse {
                        index,
                        reject,
                        reject_hint,
                    } => {
                        self.handle_append_entries_response(from, index, reject, reject_hint);
                    }
                    MessagePayload::HeartbeatResponse => {
                        if self.progress[&from].matched < self.raft_log.last_index() {
                            self.send_append(from);
                        }
                    }
                    MessagePayload::TransferLeader => {
                        self.handle_transfer_leader(from);
                    }
                    _ => {}
                }
                Ok(())
            }
        }
    }

    fn reset_randomized_election_timeout(&mut self) {
        self.randomized_election_timeout =
            self.election_timeout + self.rng.gen_range(0..self.election_timeout);
    }
}
