//! Container identity and executor metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of one container instance.
///
/// Stable for the container's whole life and used as the key of every
/// assignment record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ContainerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Describes the executor that owns a container.
///
/// Strategies may use it to pick an endpoint; the assigner passes it through
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutorInfo {
    pub framework_id: String,
    pub executor_id: String,
}

impl ExecutorInfo {
    pub fn new(framework_id: impl Into<String>, executor_id: impl Into<String>) -> Self {
        Self {
            framework_id: framework_id.into(),
            executor_id: executor_id.into(),
        }
    }
}

/// A container the agent believes is live, as reported at recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub container_id: ContainerId,
    pub executor_info: ExecutorInfo,
}

impl ContainerState {
    pub fn new(container_id: impl Into<ContainerId>, executor_info: ExecutorInfo) -> Self {
        Self {
            container_id: container_id.into(),
            executor_info,
        }
    }
}
