//! A deterministic in-memory cluster for integration tests.
//!
//! Each node is a [`RawNode`] over its own [`MemStorage`]. The router
//! preserves FIFO order per destination, can isolate nodes, and drives the
//! Ready/Advance protocol the way a production driver would: persist the
//! snapshot, entries and hard state, send messages, apply committed entries,
//! then advance.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;

use memstore::MemStorage;
use monoraft::Config;
use monoraft::Entry;
use monoraft::EntryPayload;
use monoraft::Error;
use monoraft::Message;
use monoraft::NodeId;
use monoraft::RawNode;
use monoraft::StateRole;

pub const ELECTION_TICK: usize = 10;
pub const HEARTBEAT_TICK: usize = 1;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Cluster {
    pub nodes: BTreeMap<NodeId, RawNode<MemStorage>>,
    pub stores: BTreeMap<NodeId, MemStorage>,

    /// What each node's "application" has applied, in order.
    pub applied: BTreeMap<NodeId, Vec<Entry>>,

    inboxes: BTreeMap<NodeId, VecDeque<Message>>,
    isolated: BTreeSet<NodeId>,
}

impl Cluster {
    /// A fresh group of `n` nodes with ids `1..=n`, each bootstrapped with
    /// the full voter set.
    pub fn new(n: u64) -> Cluster {
        init_tracing();

        let ids: Vec<NodeId> = (1..=n).collect();
        let mut cluster = Cluster {
            nodes: BTreeMap::new(),
            stores: BTreeMap::new(),
            applied: BTreeMap::new(),
            inboxes: BTreeMap::new(),
            isolated: BTreeSet::new(),
        };
        for &id in &ids {
            cluster.add_node_with_store(id, MemStorage::new_with_conf_state(ids.clone()));
        }
        cluster
    }

    pub fn add_node_with_store(&mut self, id: NodeId, store: MemStorage) {
        let config = Config {
            id,
            election_tick: ELECTION_TICK,
            heartbeat_tick: HEARTBEAT_TICK,
            ..Default::default()
        };
        let node = RawNode::new(&config, store.clone()).unwrap();

        self.nodes.insert(id, node);
        self.stores.insert(id, store);
        self.applied.insert(id, Vec::new());
        self.inboxes.insert(id, VecDeque::new());
    }

    pub fn node(&self, id: NodeId) -> &RawNode<MemStorage> {
        &self.nodes[&id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut RawNode<MemStorage> {
        self.nodes.get_mut(&id).unwrap()
    }

    /// Cut a node off: its inbound and outbound messages are dropped.
    pub fn isolate(&mut self, id: NodeId) {
        self.isolated.insert(id);
    }

    pub fn heal(&mut self, id: NodeId) {
        self.isolated.remove(&id);
    }

    /// The current leader, if exactly the expected picture holds: the leader
    /// with the highest term wins ties from stale partitions.
    pub fn leader(&self) -> Option<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.raft.role == StateRole::Leader)
            .max_by_key(|n| n.raft.term)
            .map(|n| n.raft.id)
    }

    /// Tick one node once and flush whatever came out of it.
    pub fn tick(&mut self, id: NodeId) {
        self.node_mut(id).tick();
        self.process_node(id);
    }

    /// Tick `id` until its randomized timeout fires and it starts a campaign,
    /// then let the cluster settle.
    pub fn tick_until_campaign(&mut self, id: NodeId) {
        for _ in 0..2 * ELECTION_TICK {
            self.node_mut(id).tick();
            if self.node(id).raft.role != StateRole::Follower {
                break;
            }
        }
        self.run();
    }

    /// Force-elect `id` and settle.
    pub fn elect(&mut self, id: NodeId) {
        self.node_mut(id).campaign().unwrap();
        self.run();
        assert_eq!(Some(id), self.leader(), "node {} failed to win its election", id);
    }

    /// Propose on `id` and settle.
    pub fn propose(&mut self, id: NodeId, data: &[u8]) -> Result<(), Error> {
        let res = self.node_mut(id).propose(data.to_vec());
        self.run();
        res
    }

    /// Deliver and process until no messages are in flight.
    pub fn run(&mut self) {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();

        for &id in &ids {
            self.process_node(id);
        }
        while self.inboxes.values().any(|q| !q.is_empty()) {
            for &id in &ids {
                self.deliver(id);
                self.process_node(id);
            }
        }
    }

    fn deliver(&mut self, id: NodeId) {
        let msgs: Vec<Message> = self.inboxes.get_mut(&id).unwrap().drain(..).collect();
        if self.isolated.contains(&id) {
            return;
        }
        for m in msgs {
            let _ = self.nodes.get_mut(&id).unwrap().step(m);
        }
    }

    /// Drive one node's ready loop to quiescence, routing its messages.
    fn process_node(&mut self, id: NodeId) {
        loop {
            let (msgs, committed, installed_snapshot) = {
                let node = self.nodes.get_mut(&id).unwrap();
                if !node.has_ready() {
                    break;
                }
                let store = &self.stores[&id];

                let mut rd = node.ready();
                let installed_snapshot = rd.snapshot().is_some();
                if let Some(snap) = rd.snapshot() {
                    store.apply_snapshot(snap.clone()).unwrap();
                }
                store.append(rd.entries()).unwrap();
                if let Some(hs) = rd.hard_state() {
                    store.set_hard_state(hs.clone());
                }
                let msgs = rd.take_messages();
                let committed = rd.take_committed_entries();
                node.advance(rd);

                for e in &committed {
                    if let EntryPayload::ConfChange(cc) = &e.payload {
                        let cs = node.apply_conf_change(cc);
                        store.set_conf_state(cs);
                    }
                }

                (msgs, committed, installed_snapshot)
            };

            if installed_snapshot {
                // The snapshot replaced the application state wholesale.
                self.applied.get_mut(&id).unwrap().clear();
            }
            self.applied.get_mut(&id).unwrap().extend(committed);
            self.route(id, msgs);
        }
    }

    fn route(&mut self, from: NodeId, msgs: Vec<Message>) {
        for m in msgs {
            if self.isolated.contains(&from) || self.isolated.contains(&m.to) {
                continue;
            }
            if let Some(inbox) = self.inboxes.get_mut(&m.to) {
                inbox.push_back(m);
            }
        }
    }

    /// The normal-entry payloads a node has applied, for state-machine
    /// safety assertions.
    pub fn applied_data(&self, id: NodeId) -> Vec<Vec<u8>> {
        self.applied[&id]
            .iter()
            .filter_map(|e| match &e.payload {
                EntryPayload::Normal(data) if !data.is_empty() => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Log matching: every pair of live nodes holds identical logs over the
    /// shared index range.
    pub fn assert_logs_match(&self, ids: &[NodeId]) {
        for &a in ids {
            for &b in ids {
                if a >= b {
                    continue;
                }
                let log_a = self.node(a).raft.raft_log.entries(self.node(a).raft.raft_log.first_index()).unwrap();
                let log_b = self.node(b).raft.raft_log.entries(self.node(b).raft.raft_log.first_index()).unwrap();
                let lo = std::cmp::max(
                    log_a.first().map(|e| e.index).unwrap_or(u64::MAX),
                    log_b.first().map(|e| e.index).unwrap_or(u64::MAX),
                );
                let hi = std::cmp::min(
                    log_a.last().map(|e| e.index).unwrap_or(0),
                    log_b.last().map(|e| e.index).unwrap_or(0),
                );
                for i in lo..=hi {
                    let ea = log_a.iter().find(|e| e.index == i).unwrap();
                    let eb = log_b.iter().find(|e| e.index == i).unwrap();
                    assert_eq!(ea, eb, "log mismatch between {} and {} at index {}", a, b, i);
                }
            }
        }
    }
}
