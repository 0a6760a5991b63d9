use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use super::{InputStrategy, StrategyError};
use crate::domain::{ContainerId, ExecutorInfo, UdpEndpoint};

/// Gives each container its own port from an inclusive range.
///
/// Allocation always picks the lowest free port, so a restarted agent with
/// the same history hands out the same ports.
#[derive(Debug, Clone)]
pub struct PortRangeStrategy {
    host: String,
    start: u16,
    end: u16,
    free: BTreeSet<u16>,
    assigned: HashMap<ContainerId, u16>,
    holders: HashMap<u16, ContainerId>,
}

impl PortRangeStrategy {
    /// Create a pool over `[start, end]` on `host`.
    pub fn new(host: impl Into<String>, start: u16, end: u16) -> Result<Self, StrategyError> {
        if start == 0 || start > end {
            return Err(StrategyError::InvalidRange { start, end });
        }
        Ok(Self {
            host: host.into(),
            start,
            end,
            free: (start..=end).collect(),
            assigned: HashMap::new(),
            holders: HashMap::new(),
        })
    }

    /// Total number of ports in the range.
    pub fn capacity(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    /// Number of ports not bound to any container.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    fn endpoint(&self, port: u16) -> UdpEndpoint {
        UdpEndpoint::new(self.host.clone(), port)
    }

    fn claim(&mut self, container_id: &ContainerId, port: u16) {
        self.free.remove(&port);
        self.assigned.insert(container_id.clone(), port);
        self.holders.insert(port, container_id.clone());
    }
}

impl InputStrategy for PortRangeStrategy {
    fn name(&self) -> &'static str {
        "port-range"
    }

    fn allocate(
        &mut self,
        container_id: &ContainerId,
        executor: &ExecutorInfo,
    ) -> Result<UdpEndpoint, StrategyError> {
        if self.assigned.contains_key(container_id) {
            return Err(StrategyError::AlreadyRegistered(container_id.clone()));
        }
        let Some(port) = self.free.first().copied() else {
            warn!(
                container_id = %container_id,
                framework_id = %executor.framework_id,
                start = self.start,
                end = self.end,
                "Port range exhausted"
            );
            return Err(StrategyError::PortsExhausted {
                start: self.start,
                end: self.end,
            });
        };

        self.claim(container_id, port);
        debug!(
            container_id = %container_id,
            port,
            available = self.free.len(),
            "Allocated port from range"
        );
        Ok(self.endpoint(port))
    }

    fn bind_existing(
        &mut self,
        container_id: &ContainerId,
        _executor: &ExecutorInfo,
        endpoint: UdpEndpoint,
    ) -> Result<(), StrategyError> {
        let port = endpoint.port;
        if endpoint.host != self.host {
            return Err(StrategyError::EndpointMismatch {
                expected: self.endpoint(port),
                actual: endpoint,
            });
        }
        if !(self.start..=self.end).contains(&port) {
            return Err(StrategyError::PortOutOfRange {
                port,
                start: self.start,
                end: self.end,
            });
        }

        match self.assigned.get(container_id) {
            Some(&held) if held == port => return Ok(()),
            Some(_) => return Err(StrategyError::AlreadyRegistered(container_id.clone())),
            None => {}
        }
        if let Some(holder) = self.holders.get(&port) {
            return Err(StrategyError::PortInUse {
                port,
                holder: holder.clone(),
            });
        }

        self.claim(container_id, port);
        debug!(container_id = %container_id, port, "Rebound container to persisted port");
        Ok(())
    }

    fn release(&mut self, container_id: &ContainerId) -> Option<UdpEndpoint> {
        let port = self.assigned.remove(container_id)?;
        self.holders.remove(&port);
        self.free.insert(port);
        debug!(container_id = %container_id, port, "Released port back to range");
        Some(self.endpoint(port))
    }

    fn endpoint_of(&self, container_id: &ContainerId) -> Option<UdpEndpoint> {
        self.assigned
            .get(container_id)
            .map(|&port| self.endpoint(port))
    }
}
