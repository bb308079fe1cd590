//! An in-memory implementation of the monoraft [`Storage`] contract.
//!
//! The store is a cheaply clonable handle over shared state, so a test
//! harness can keep writing to it (from the Ready bundle) while the Raft node
//! it was handed to keeps reading.

use std::sync::Arc;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use monoraft::ConfState;
use monoraft::Entry;
use monoraft::HardState;
use monoraft::NodeId;
use monoraft::Snapshot;
use monoraft::SnapshotMeta;
use monoraft::Storage;
use monoraft::StorageError;


/// The state behind a [`MemStorage`] handle.
#[derive(Debug, Clone, Default)]
pub struct MemStorageCore {
    hard_state: HardState,
    conf_state: ConfState,

    /// Metadata of the last compaction point; entries start right above it.
    snapshot_metadata: SnapshotMeta,

    /// Entries since the last snapshot; `entries[0].index == snapshot_metadata.index + 1`.
    entries: Vec<Entry>,

    /// When set, `snapshot()` reports a building snapshot once, then resets.
    trigger_snap_unavailable: bool,
}

impl MemStorageCore {
    fn first_index(&self) -> u64 {
        self.snapshot_metadata.index + 1
    }

    fn last_index(&self) -> u64 {
        self.snapshot_metadata.index + self.entries.len() as u64
    }

    pub fn set_hard_state(&mut self, hs: HardState) {
        self.hard_state = hs;
    }

    pub fn set_conf_state(&mut self, cs: ConfState) {
        self.conf_state = cs;
    }

    pub fn hard_state(&self) -> &HardState {
        &self.hard_state
    }

    fn append(&mut self, ents: &[Entry]) -> Result<(), StorageError> {
        let first_new = match ents.first() {
            Some(e) => e.index,
            None => return Ok(()),
        };

        if first_new < self.first_index() {
            panic!(
                "overwriting compacted logs: appending from {}, compacted to {}",
                first_new,
                self.first_index() - 1
            );
        }
        if first_new > self.last_index() + 1 {
            panic!(
                "appending from {} leaves a gap after last stored index {}",
                first_new,
                self.last_index()
            );
        }

        // Drop any stored suffix the new entries overwrite, then extend.
        self.entries.truncate((first_new - self.first_index()) as usize);
        self.entries.extend_from_slice(ents);
        Ok(())
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot) -> Result<(), StorageError> {
        if snapshot.meta.index < self.snapshot_metadata.index {
            return Err(StorageError::Compacted);
        }

        self.conf_state = snapshot.meta.conf_state.clone();
        self.hard_state.commit = snapshot.meta.index;
        self.hard_state.term = std::cmp::max(self.hard_state.term, snapshot.meta.term);
        self.snapshot_metadata = snapshot.meta;
        self.entries.clear();
        Ok(())
    }

    fn compact(&mut self, compact_index: u64) -> Result<(), StorageError> {
        if compact_index < self.first_index() {
            return Err(StorageError::Compacted);
        }
        if compact_index > self.last_index() {
            return Err(StorageError::Unavailable);
        }

        let term = self.entries[(compact_index - self.first_index()) as usize].term;
        let keep_from = (compact_index + 1 - self.first_index()) as usize;
        self.entries.drain(..keep_from);
        self.snapshot_metadata = SnapshotMeta {
            index: compact_index,
            term,
            conf_state: self.conf_state.clone(),
        };
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        // Built on demand at the commit point. The data payload is the
        // application's business and stays empty here.
        let index = self.hard_state.commit;
        let term = if index == self.snapshot_metadata.index {
            self.snapshot_metadata.term
        } else {
            self.entries[(index - self.first_index()) as usize].term
        };

        Snapshot {
            data: Vec::new(),
            meta: SnapshotMeta {
                index,
                term,
                conf_state: self.conf_state.clone(),
            },
        }
    }
}

/// A clonable in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemStorage {
    core: Arc<RwLock<MemStorageCore>>,
}

impl MemStorage {
    pub fn new() -> MemStorage {
        MemStorage::default()
    }

    /// A store bootstrapped with an initial voter set, as if the group had
    /// been created by an administrator before the first start.
    pub fn new_with_conf_state(nodes: Vec<NodeId>) -> MemStorage {
        let store = MemStorage::new();
        store.wl().conf_state = ConfState::new(nodes);
        store
    }

    pub fn rl(&self) -> RwLockReadGuard<'_, MemStorageCore> {
        self.core.read().unwrap()
    }

    pub fn wl(&self) -> RwLockWriteGuard<'_, MemStorageCore> {
        self.core.write().unwrap()
    }

    /// Persist entries from a Ready bundle, overwriting any diverging suffix.
    pub fn append(&self, ents: &[Entry]) -> Result<(), StorageError> {
        self.wl().append(ents)
    }

    pub fn set_hard_state(&self, hs: HardState) {
        self.wl().set_hard_state(hs);
    }

    pub fn set_conf_state(&self, cs: ConfState) {
        self.wl().set_conf_state(cs);
    }

    /// Install a snapshot received from the leader: replace the log prefix
    /// and adopt its membership and commit point.
    pub fn apply_snapshot(&self, snapshot: Snapshot) -> Result<(), StorageError> {
        tracing::info!(index = snapshot.meta.index, term = snapshot.meta.term, "apply snapshot");
        self.wl().apply_snapshot(snapshot)
    }

    /// Discard entries up to and including `compact_index`, recording the
    /// boundary as the new snapshot point.
    pub fn compact(&self, compact_index: u64) -> Result<(), StorageError> {
        self.wl().compact(compact_index)
    }

    /// Make the next `snapshot()` call fail with
    /// [`StorageError::SnapshotTemporarilyUnavailable`].
    pub fn trigger_snap_unavailable(&self) {
        self.wl().trigger_snap_unavailable = true;
    }
}

impl Storage for MemStorage {
    fn initial_state(&self) -> (HardState, ConfState) {
        let core = self.rl();
        (core.hard_state.clone(), core.conf_state.clone())
    }

    fn entries(&self, lo: u64, hi: u64) -> Result<Vec<Entry>, StorageError> {
        let core = self.rl();
        if lo < core.first_index() {
            return Err(StorageError::Compacted);
        }
        if hi > core.last_index() + 1 {
            return Err(StorageError::Unavailable);
        }

        let offset = core.first_index();
        Ok(core.entries[(lo - offset) as usize..(hi - offset) as usize].to_vec())
    }

    fn term(&self, idx: u64) -> Result<u64, StorageError> {
        let core = self.rl();
        if idx == core.snapshot_metadata.index {
            return Ok(core.snapshot_metadata.term);
        }
        if idx < core.first_index() {
            return Err(StorageError::Compacted);
        }
        if idx > core.last_index() {
            return Err(StorageError::Unavailable);
        }
        Ok(core.entries[(idx - core.first_index()) as usize].term)
    }

    fn first_index(&self) -> u64 {
        self.rl().first_index()
    }

    fn last_index(&self) -> u64 {
        self.rl().last_index()
    }

    fn snapshot(&self) -> Result<Snapshot, StorageError> {
        let mut core = self.wl();
        if core.trigger_snap_unavailable {
            core.trigger_snap_unavailable = false;
            return Err(StorageError::SnapshotTemporarilyUnavailable);
        }
        Ok(core.snapshot())
    }
}
