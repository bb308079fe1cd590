use memstore::MemStorage;
use pretty_assertions::assert_eq;

use crate::message::Message;
use crate::message::MessagePayload;
use crate::progress::Progress;
use crate::raft::tests::fixtures::ents;
use crate::raft::tests::fixtures::new_test_raft;
use crate::raft::tests::fixtures::new_test_raft_with_storage;
use crate::raft_types::ConfState;
use crate::raft_types::HardState;
use crate::raft_types::StateRole;
use crate::raft_types::INVALID_ID;
use crate::storage::Snapshot;
use crate::storage::SnapshotMeta;

fn snapshot(index: u64, term: u64, nodes: Vec<u64>) -> Snapshot {
    Snapshot {
        data: Vec::new(),
        meta: SnapshotMeta {
            index,
            term,
            conf_state: ConfState::new(nodes),
        },
    }
}

/// A two-node leader whose log up to the commit point was compacted away.
fn new_compacted_leader() -> crate::raft::Raft<MemStorage> {
    let store = MemStorage::new_with_conf_state(vec![1, 2]);
    store.append(&ents(&[(1, 1), (1, 2)])).unwrap();
    store.set_hard_state(HardState {
        term: 1,
        vote: INVALID_ID,
        commit: 2,
    });
    store.compact(2).unwrap();

    let mut r = new_test_raft_with_storage(1, 10, 1, store);
    r.campaign();
    r.step(Message::new(2, 1, 2, MessagePayload::RequestVoteResponse { reject: false })).unwrap();
    assert_eq!(StateRole::Leader, r.role);
    r.take_messages();
    r
}

/// When the prefix a follower needs is compacted, the leader ships a snapshot
/// instead of entries.
#[test]
fn test_send_snapshot_when_prefix_compacted() {
    let mut r = new_compacted_leader();

    // Probe below the compaction boundary.
    *r.progress.get_mut(&2).unwrap() = Progress::new(0, 2);
    assert!(r.send_append(2));

    let msgs = r.take_messages();
    assert_eq!(1, msgs.len());
    match &msgs[0].payload {
        MessagePayload::Snapshot { snapshot } => {
            assert_eq!(2, snapshot.meta.index);
            assert_eq!(1, snapshot.meta.term);
            assert_eq!(ConfState::new(vec![1, 2]), snapshot.meta.conf_state);
        }
        p => panic!("expected a snapshot message, got {:?}", p),
    }
}

/// A snapshot still being built suppresses the send; the next round retries.
#[test]
fn test_snapshot_temporarily_unavailable_skips_round() {
    let mut r = new_compacted_leader();
    *r.progress.get_mut(&2).unwrap() = Progress::new(0, 2);

    r.raft_log.store.trigger_snap_unavailable();
    assert!(!r.send_append(2));
    assert!(r.take_messages().is_empty());

    // The condition was transient.
    assert!(r.send_append(2));
    assert_eq!(1, r.take_messages().len());
}

#[test]
fn test_restore_from_snapshot() -> anyhow::Result<()> {
    let mut r = new_test_raft(2, vec![1, 2], 10, 1);

    r.step(Message::new(
        1,
        2,
        2,
        MessagePayload::Snapshot {
            snapshot: snapshot(5, 2, vec![1, 2, 3]),
        },
    ))?;

    assert_eq!(StateRole::Follower, r.role);
    assert_eq!(1, r.leader_id);
    assert_eq!(5, r.raft_log.committed());
    assert_eq!(6, r.raft_log.first_index());
    assert_eq!(5, r.raft_log.last_index());
    assert!(r.raft_log.pending_snapshot().is_some());

    // Membership comes from the snapshot.
    assert_eq!(vec![1, 2, 3], r.progress.keys().copied().collect::<Vec<_>>());

    assert_eq!(
        vec![Message::new(
            2,
            1,
            2,
            MessagePayload::AppendEntriesResponse {
                index: 5,
                reject: false,
                reject_hint: 0,
            },
        )],
        r.take_messages()
    );

    Ok(())
}

/// A snapshot at or below the commit point carries nothing new; the reply
/// lets the leader move past it.
#[test]
fn test_stale_snapshot_ignored() -> anyhow::Result<()> {
    let mut r = new_test_raft(2, vec![1, 2], 10, 1);
    r.step(Message::new(
        1,
        2,
        2,
        MessagePayload::Snapshot {
            snapshot: snapshot(5, 2, vec![1, 2]),
        },
    ))?;
    r.take_messages();

    r.step(Message::new(
        1,
        2,
        2,
        MessagePayload::Snapshot {
            snapshot: snapshot(3, 1, vec![1, 2]),
        },
    ))?;

    assert_eq!(5, r.raft_log.committed());
    assert_eq!(
        vec![Message::new(
            2,
            1,
            2,
            MessagePayload::AppendEntriesResponse {
                index: 5,
                reject: false,
                reject_hint: 0,
            },
        )],
        r.take_messages()
    );

    Ok(())
}

/// If the log already contains the snapshot's last entry, only the commit
/// point moves; the log is kept.
#[test]
fn test_snapshot_fast_forwards_commit() -> anyhow::Result<()> {
    let store = MemStorage::new_with_conf_state(vec![1, 2]);
    store.append(&ents(&[(1, 1), (1, 2), (1, 3)])).unwrap();
    let mut r = new_test_raft_with_storage(2, 10, 1, store);

    r.step(Message::new(
        1,
        2,
        1,
        MessagePayload::Snapshot {
            snapshot: snapshot(3, 1, vec![1, 2]),
        },
    ))?;

    assert_eq!(3, r.raft_log.committed());
    assert_eq!(3, r.raft_log.last_index());
    assert!(r.raft_log.pending_snapshot().is_none());
    assert_eq!(
        vec![Message::new(
            2,
            1,
            1,
            MessagePayload::AppendEntriesResponse {
                index: 3,
                reject: false,
                reject_hint: 0,
            },
        )],
        r.take_messages()
    );

    Ok(())
}
