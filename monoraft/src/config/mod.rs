//! Runtime configuration of a Raft node.

#[allow(clippy::module_inception)]
mod config;
mod error;

pub use self::config::Config;
pub use self::error::ConfigError;
