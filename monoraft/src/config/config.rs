use crate::config::error::ConfigError;
use crate::raft_types::NodeId;
use crate::raft_types::INVALID_ID;

/// The parameters to start a Raft node.
///
/// Timers are logical: the driver calls `tick()` at its own cadence, and the
/// config counts ticks. Follow the Raft timing inequality
/// `heartbeat_tick ≪ election_tick`; `election_tick = 10 * heartbeat_tick`
/// avoids needless leader churn.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Config {
    /// The identity of this node. Must not be [`INVALID_ID`].
    pub id: NodeId,

    /// Ids of all members when bootstrapping a brand-new group.
    ///
    /// Must be left empty when restarting: the membership then comes from the
    /// stored `ConfState`.
    pub peers: Vec<NodeId>,

    /// Number of ticks without leader contact before a follower campaigns.
    /// The effective timeout is re-drawn uniformly from
    /// `[election_tick, 2 * election_tick - 1]` on every timer reset.
    pub election_tick: usize,

    /// Number of ticks between two heartbeat broadcasts by the leader.
    pub heartbeat_tick: usize,

    /// The last index already applied by the application, set when
    /// restarting so committed entries are not re-delivered.
    pub applied: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: INVALID_ID,
            peers: Vec::new(),
            election_tick: 10,
            heartbeat_tick: 1,
            applied: 0,
        }
    }
}

impl Config {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Check the construction constraints: `id != 0`, `election_tick > heartbeat_tick > 0`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id == INVALID_ID {
            return Err(ConfigError::NodeIdIsZero);
        }

        if self.heartbeat_tick == 0 {
            return Err(ConfigError::HeartbeatTickIsZero);
        }

        if self.election_tick <= self.heartbeat_tick {
            return Err(ConfigError::ElectionTickLEHeartbeatTick {
                election_tick: self.election_tick,
                heartbeat_tick: self.heartbeat_tick,
            });
        }

        Ok(())
    }
}
