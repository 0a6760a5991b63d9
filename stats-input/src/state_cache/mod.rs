//! Durable record of which endpoint each container was assigned.
//!
//! The assigner reads the whole record once at recovery and keeps it current
//! on every registration change. Implementations:
//!
//! - [`FileStateCache`]: one JSON document rewritten atomically on change
//! - [`MemoryStateCache`]: non-durable, for hosts without a state directory

mod file;
mod memory;

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{ContainerEndpoints, ContainerId, UdpEndpoint};

pub use file::FileStateCache;
pub use memory::MemoryStateCache;

/// Errors raised while reading or writing persisted assignments.
#[derive(Debug, Error)]
pub enum StateCacheError {
    #[error("IO error while {op} at {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported state file version {0}")]
    UnsupportedVersion(u32),
}

impl StateCacheError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Persisted container to endpoint mapping.
#[cfg_attr(test, mockall::automock)]
pub trait StateCache: Send {
    /// Where the record lives, for diagnostics only.
    fn backing_location(&self) -> String;

    /// Read every persisted assignment.
    fn load_all(&mut self) -> Result<ContainerEndpoints, StateCacheError>;

    /// Persist an assignment, replacing any previous one for the container.
    fn insert(
        &mut self,
        container_id: &ContainerId,
        endpoint: &UdpEndpoint,
    ) -> Result<(), StateCacheError>;

    /// Forget a container's assignment. Removing an unknown container is not
    /// an error.
    fn remove(&mut self, container_id: &ContainerId) -> Result<(), StateCacheError>;
}
