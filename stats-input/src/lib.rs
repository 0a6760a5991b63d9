//! stats-input library crate.
//!
//! Assigns the UDP endpoints containers use to emit telemetry and keeps the
//! assignments consistent across concurrent callers and agent restarts.

pub mod assigner;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod panic_hook;
pub mod services;
pub mod state_cache;
pub mod strategy;

#[cfg(test)]
mod test_utils;

pub use assigner::{AssignerError, InputAssigner, RecoverySummary};
pub use config::{AssignerConfig, PortMode};
pub use domain::{ContainerEndpoints, ContainerId, ContainerState, ExecutorInfo, UdpEndpoint};
pub use error::{Error, Result};
pub use services::AssignerServices;
pub use state_cache::{FileStateCache, MemoryStateCache, StateCache, StateCacheError};
pub use strategy::{FixedPortStrategy, InputStrategy, PortRangeStrategy, StrategyError};
