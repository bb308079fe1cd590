use std::collections::BTreeSet;

use maplit::btreeset;
use pretty_assertions::assert_eq;

use crate::entry::ConfChange;
use crate::entry::ConfChangeType;
use crate::entry::Entry;
use crate::entry::EntryPayload;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::progress::Progress;
use crate::raft::tests::fixtures::new_test_raft;
use crate::raft_types::StateRole;

fn add(node_id: u64) -> ConfChange {
    ConfChange {
        change_type: ConfChangeType::AddNode,
        node_id,
    }
}

fn remove(node_id: u64) -> ConfChange {
    ConfChange {
        change_type: ConfChangeType::RemoveNode,
        node_id,
    }
}

fn propose_cc(id: u64, cc: ConfChange) -> Message {
    Message::local(
        id,
        id,
        MessagePayload::Propose {
            entries: vec![Entry::new(EntryPayload::ConfChange(cc))],
        },
    )
}

/// `add_node(id); add_node(id)` is `add_node(id)`.
#[test]
fn test_add_node_is_idempotent() {
    let mut r = new_test_raft(1, vec![1, 2, 3], 10, 1);

    r.add_node(4);
    assert_eq!(Some(&Progress::new(0, 1)), r.progress.get(&4));

    r.add_node(4);
    assert_eq!(
        btreeset![1, 2, 3, 4],
        r.progress.keys().copied().collect::<BTreeSet<_>>()
    );
    assert_eq!(Some(&Progress::new(0, 1)), r.progress.get(&4));
}

#[test]
fn test_remove_absent_node_is_noop() {
    let mut r = new_test_raft(1, vec![1, 2, 3], 10, 1);

    r.remove_node(9);
    assert_eq!(3, r.progress.len());
}

/// Removing peers shrinks the quorum; entries replicated on the survivors
/// may become committable on the spot.
#[test]
fn test_remove_node_recommits() -> anyhow::Result<()> {
    let mut r = new_test_raft(1, vec![1, 2, 3], 10, 1);
    r.campaign();
    r.step(Message::new(2, 1, 1, MessagePayload::RequestVoteResponse { reject: false }))?;
    assert_eq!(StateRole::Leader, r.role);
    r.take_messages();

    // Nobody acked the no-op yet; it is replicated only on the leader.
    assert_eq!(0, r.raft_log.committed());

    r.remove_node(3);
    assert_eq!(0, r.raft_log.committed());

    // Down to a group of one, the leader's own log is a quorum.
    r.remove_node(2);
    assert_eq!(1, r.raft_log.committed());

    Ok(())
}

#[test]
fn test_remove_last_node_leaves_empty_group() {
    let mut r = new_test_raft(1, vec![1], 10, 1);
    assert_eq!(StateRole::Leader, r.role);

    r.remove_node(1);
    assert!(r.progress.is_empty());
}

/// Only one conf change may be in flight: a second proposal before the first
/// is applied is downgraded to an empty normal entry.
#[test]
fn test_second_conf_change_downgraded_to_noop() -> anyhow::Result<()> {
    // A single-voter leader commits everything instantly, which keeps the
    // gap between committed and applied visible.
    let mut r = new_test_raft(1, vec![1], 10, 1);
    assert_eq!(StateRole::Leader, r.role);

    r.step(propose_cc(1, add(2)))?;
    assert_eq!(2, r.pending_conf_index);
    assert_eq!(
        EntryPayload::ConfChange(add(2)),
        r.raft_log.entries(2)?[0].payload
    );

    // The first change is committed but not applied yet.
    r.step(propose_cc(1, add(3)))?;
    assert_eq!(2, r.pending_conf_index);
    assert_eq!(EntryPayload::noop(), r.raft_log.entries(3)?[0].payload);

    // After applying it, the next change is accepted again.
    r.raft_log.applied_to(3);
    r.add_node(2);
    r.step(propose_cc(1, add(3)))?;
    assert_eq!(4, r.pending_conf_index);
    assert_eq!(
        EntryPayload::ConfChange(add(3)),
        r.raft_log.entries(4)?[0].payload
    );

    Ok(())
}

/// A leader removed from the membership refuses new proposals.
#[test]
fn test_removed_leader_drops_proposals() {
    let mut r = new_test_raft(1, vec![1], 10, 1);
    assert_eq!(StateRole::Leader, r.role);

    r.remove_node(1);

    let got = r.step(propose_cc(1, remove(1)));
    assert_eq!(Err(crate::error::Error::ProposalDropped), got);
}
