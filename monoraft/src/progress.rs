//! Per-peer replication bookkeeping, maintained only at the leader.

use std::fmt;

/// The leader's view of one follower: the highest index known replicated
/// (`matched`) and the next index to send (`next_idx`).
///
/// `matched < next_idx` always holds. The follower is probed with one
/// `AppendEntries` per heartbeat or response turnaround until a send is
/// accepted; there is no pipelining window to track.
#[derive(Debug, Clone, Copy, Default)]
#[derive(PartialEq, Eq)]
pub struct Progress {
    pub matched: u64,
    pub next_idx: u64,
}

impl Progress {
    pub(crate) fn new(matched: u64, next_idx: u64) -> Self {
        Self { matched, next_idx }
    }

    /// Apply a positive acknowledgement up to `n`.
    ///
    /// Returns `false` if `n` comes from an outdated message; duplicate acks
    /// with the same index update nothing.
    pub fn maybe_update(&mut self, n: u64) -> bool {
        let mut updated = false;
        if self.matched < n {
            tracing::debug!(progress = display(&self), n = n, "update matched");
            self.matched = n;
            updated = true;
        }
        if self.next_idx < n + 1 {
            self.next_idx = n + 1;
        }
        updated
    }

    /// Back off `next_idx` after a rejection of the probe at `rejected`,
    /// using the follower's last index as a hint.
    ///
    /// Returns `false` if the rejection is stale, i.e. the probe was below an
    /// index already known to match.
    pub fn maybe_decr_to(&mut self, rejected: u64, last_hint: u64) -> bool {
        if rejected <= self.matched {
            return false;
        }

        self.next_idx = std::cmp::max(1, std::cmp::min(rejected, last_hint + 1));
        tracing::debug!(progress = display(&self), rejected = rejected, "backed off next_idx");
        true
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{matched:{}, next:{}}}", self.matched, self.next_idx)
    }
}
