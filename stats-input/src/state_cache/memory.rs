use std::sync::Arc;

use parking_lot::Mutex;

use super::{StateCache, StateCacheError};
use crate::domain::{ContainerEndpoints, ContainerId, UdpEndpoint};

/// In-memory assignment record.
///
/// Clones share the same map, so a host can keep a handle for inspection
/// after giving the cache to the assigner.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateCache {
    entries: Arc<Mutex<ContainerEndpoints>>,
}

impl MemoryStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing record, as if it had been persisted earlier.
    pub fn with_entries(entries: ContainerEndpoints) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    pub fn snapshot(&self) -> ContainerEndpoints {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl StateCache for MemoryStateCache {
    fn backing_location(&self) -> String {
        "memory".to_string()
    }

    fn load_all(&mut self) -> Result<ContainerEndpoints, StateCacheError> {
        Ok(self.snapshot())
    }

    fn insert(
        &mut self,
        container_id: &ContainerId,
        endpoint: &UdpEndpoint,
    ) -> Result<(), StateCacheError> {
        self.entries
            .lock()
            .insert(container_id.clone(), endpoint.clone());
        Ok(())
    }

    fn remove(&mut self, container_id: &ContainerId) -> Result<(), StateCacheError> {
        self.entries.lock().remove(container_id);
        Ok(())
    }
}
