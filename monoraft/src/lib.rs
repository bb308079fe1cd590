//! A single-group Raft consensus core, free of I/O.
//!
//! The state machine consumes input messages and logical tick signals and
//! produces outbound messages, persistence directives and committed entries;
//! it never touches the network, the disk or the clock itself. The external
//! collaborators are:
//!
//! - a [`Storage`] holding the durable log prefix and the last [`HardState`];
//! - a transport delivering [`Message`]s between peers;
//! - an application consuming committed [`Entry`]s;
//! - a driver calling [`RawNode::tick`] at its own cadence and moving
//!   [`Ready`] bundles between the core and the other three.
//!
//! A minimal driver loop:
//!
//! ```ignore
//! let mut node = RawNode::new(&config, store.clone())?;
//! loop {
//!     // deliver inbound messages via node.step(m), ticks via node.tick()
//!     if !node.has_ready() {
//!         continue;
//!     }
//!     let mut ready = node.ready();
//!     if let Some(snap) = ready.snapshot() {
//!         store.apply_snapshot(snap.clone())?;
//!     }
//!     store.append(ready.entries())?;
//!     if let Some(hs) = ready.hard_state() {
//!         store.set_hard_state(hs.clone());
//!     }
//!     transport.send(ready.take_messages());
//!     app.apply(ready.take_committed_entries());
//!     node.advance(ready);
//! }
//! ```

pub mod config;
pub mod entry;
pub mod error;
pub mod message;
pub mod metrics;
pub mod raft;
pub mod raft_log;
pub mod raw_node;
pub mod storage;

mod display_ext;
mod progress;
mod raft_types;

pub use crate::config::Config;
pub use crate::config::ConfigError;
pub use crate::entry::ConfChange;
pub use crate::entry::ConfChangeType;
pub use crate::entry::Entry;
pub use crate::entry::EntryPayload;
pub use crate::error::Error;
pub use crate::error::StorageError;
pub use crate::message::Message;
pub use crate::message::MessagePayload;
pub use crate::metrics::RaftMetrics;
pub use crate::progress::Progress;
pub use crate::raft::Raft;
pub use crate::raft_log::RaftLog;
pub use crate::raft_types::ConfState;
pub use crate::raft_types::HardState;
pub use crate::raft_types::NodeId;
pub use crate::raft_types::SoftState;
pub use crate::raft_types::StateRole;
pub use crate::raft_types::INVALID_ID;
pub use crate::raw_node::RawNode;
pub use crate::raw_node::Ready;
pub use crate::storage::Snapshot;
pub use crate::storage::SnapshotMeta;
pub use crate::storage::Storage;
