/// Error variants related to configuration.
#[derive(Debug, Clone, thiserror::Error)]
#[derive(PartialEq, Eq)]
pub enum ConfigError {
    /// `0` is reserved for "no node".
    #[error("node id must not be 0")]
    NodeIdIsZero,

    /// The heartbeat tick drives all leader liveness; it must be positive.
    #[error("heartbeat_tick must be > 0")]
    HeartbeatTickIsZero,

    /// A follower must outwait at least one heartbeat before campaigning.
    #[error("election_tick({election_tick}) must be > heartbeat_tick({heartbeat_tick})")]
    ElectionTickLEHeartbeatTick {
        election_tick: usize,
        heartbeat_tick: usize,
    },
}
