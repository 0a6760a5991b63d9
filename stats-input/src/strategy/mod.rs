//! Endpoint allocation policies.
//!
//! The assigner depends only on [`InputStrategy`]. Two policies ship with the
//! crate:
//!
//! - [`FixedPortStrategy`]: every container shares one endpoint
//! - [`PortRangeStrategy`]: each container gets its own port from a pool

mod fixed_port;
mod port_range;

use thiserror::Error;

use crate::domain::{ContainerId, ExecutorInfo, UdpEndpoint};

pub use fixed_port::FixedPortStrategy;
pub use port_range::PortRangeStrategy;

/// Errors raised by an allocation policy.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Container {0} already has an endpoint")]
    AlreadyRegistered(ContainerId),

    #[error("No free ports left in range {start}-{end}")]
    PortsExhausted { start: u16, end: u16 },

    #[error("Port {port} is outside range {start}-{end}")]
    PortOutOfRange { port: u16, start: u16, end: u16 },

    #[error("Port {port} is already held by container {holder}")]
    PortInUse { port: u16, holder: ContainerId },

    #[error("Endpoint {actual} does not match configured endpoint {expected}")]
    EndpointMismatch {
        expected: UdpEndpoint,
        actual: UdpEndpoint,
    },

    #[error("Invalid port range {start}-{end}")]
    InvalidRange { start: u16, end: u16 },
}

/// A pluggable endpoint allocation policy.
///
/// Methods take `&mut self`: the assigner only ever calls a strategy from its
/// serialized context, one call at a time.
#[cfg_attr(test, mockall::automock)]
pub trait InputStrategy: Send {
    /// Short policy name for diagnostics.
    fn name(&self) -> &'static str;

    /// Allocate a fresh endpoint and bind it to `container_id`.
    fn allocate(
        &mut self,
        container_id: &ContainerId,
        executor: &ExecutorInfo,
    ) -> Result<UdpEndpoint, StrategyError>;

    /// Bind `container_id` to an endpoint it held before a restart.
    ///
    /// Binding a container to the endpoint it already holds succeeds.
    fn bind_existing(
        &mut self,
        container_id: &ContainerId,
        executor: &ExecutorInfo,
        endpoint: UdpEndpoint,
    ) -> Result<(), StrategyError>;

    /// Release the endpoint bound to `container_id`.
    ///
    /// Returns the released endpoint, or `None` if the container was unknown.
    fn release(&mut self, container_id: &ContainerId) -> Option<UdpEndpoint>;

    /// Endpoint currently bound to `container_id`, if any.
    fn endpoint_of(&self, container_id: &ContainerId) -> Option<UdpEndpoint>;
}
