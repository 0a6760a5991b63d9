//! Value types shared by the assigner and its collaborators.

mod container;
mod endpoint;

use std::collections::HashMap;

pub use container::{ContainerId, ContainerState, ExecutorInfo};
pub use endpoint::UdpEndpoint;

/// Every container's assigned endpoint, as held by a state cache.
pub type ContainerEndpoints = HashMap<ContainerId, UdpEndpoint>;
