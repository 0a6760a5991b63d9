//! Service wiring.
//!
//! Builds the runner, strategy, and state cache from configuration and hands
//! them to an [`InputAssigner`](crate::InputAssigner).

mod container;

pub use container::AssignerServices;
