use std::collections::HashSet;

use tracing::debug;

use super::{InputStrategy, StrategyError};
use crate::domain::{ContainerId, ExecutorInfo, UdpEndpoint};

/// Hands every container the same configured endpoint.
///
/// Tracks which containers are bound so a second registration of the same
/// container is rejected.
#[derive(Debug, Clone)]
pub struct FixedPortStrategy {
    endpoint: UdpEndpoint,
    containers: HashSet<ContainerId>,
}

impl FixedPortStrategy {
    pub fn new(endpoint: UdpEndpoint) -> Self {
        Self {
            endpoint,
            containers: HashSet::new(),
        }
    }

    pub fn endpoint(&self) -> &UdpEndpoint {
        &self.endpoint
    }

    /// Number of containers currently bound.
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

impl InputStrategy for FixedPortStrategy {
    fn name(&self) -> &'static str {
        "fixed-port"
    }

    fn allocate(
        &mut self,
        container_id: &ContainerId,
        _executor: &ExecutorInfo,
    ) -> Result<UdpEndpoint, StrategyError> {
        if !self.containers.insert(container_id.clone()) {
            return Err(StrategyError::AlreadyRegistered(container_id.clone()));
        }
        debug!(container_id = %container_id, endpoint = %self.endpoint, "Bound container to shared endpoint");
        Ok(self.endpoint.clone())
    }

    fn bind_existing(
        &mut self,
        container_id: &ContainerId,
        _executor: &ExecutorInfo,
        endpoint: UdpEndpoint,
    ) -> Result<(), StrategyError> {
        if endpoint != self.endpoint {
            return Err(StrategyError::EndpointMismatch {
                expected: self.endpoint.clone(),
                actual: endpoint,
            });
        }
        self.containers.insert(container_id.clone());
        Ok(())
    }

    fn release(&mut self, container_id: &ContainerId) -> Option<UdpEndpoint> {
        self.containers
            .remove(container_id)
            .then(|| self.endpoint.clone())
    }

    fn endpoint_of(&self, container_id: &ContainerId) -> Option<UdpEndpoint> {
        self.containers
            .contains(container_id)
            .then(|| self.endpoint.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> ExecutorInfo {
        ExecutorInfo::new("f1", "e1")
    }

    #[test]
    fn test_all_containers_share_the_endpoint() {
        let mut strategy = FixedPortStrategy::new(UdpEndpoint::new("127.0.0.1", 8125));

        let a = strategy.allocate(&"a".into(), &executor()).unwrap();
        let b = strategy.allocate(&"b".into(), &executor()).unwrap();

        assert_eq!(a, b);
        assert_eq!(a, UdpEndpoint::new("127.0.0.1", 8125));
        assert_eq!(strategy.len(), 2);
    }

    #[test]
    fn test_double_allocation_is_rejected() {
        let mut strategy = FixedPortStrategy::new(UdpEndpoint::new("127.0.0.1", 8125));
        strategy.allocate(&"a".into(), &executor()).unwrap();

        let err = strategy.allocate(&"a".into(), &executor()).unwrap_err();
        assert!(matches!(err, StrategyError::AlreadyRegistered(id) if id.as_str() == "a"));
        assert_eq!(strategy.len(), 1);
    }

    #[test]
    fn test_bind_existing_requires_matching_endpoint() {
        let mut strategy = FixedPortStrategy::new(UdpEndpoint::new("127.0.0.1", 8125));

        let err = strategy
            .bind_existing(&"a".into(), &executor(), UdpEndpoint::new("127.0.0.1", 9000))
            .unwrap_err();
        assert!(matches!(err, StrategyError::EndpointMismatch { .. }));
        assert!(strategy.is_empty());

        strategy
            .bind_existing(&"a".into(), &executor(), UdpEndpoint::new("127.0.0.1", 8125))
            .unwrap();
        // Repeating the same binding is harmless.
        strategy
            .bind_existing(&"a".into(), &executor(), UdpEndpoint::new("127.0.0.1", 8125))
            .unwrap();
        assert_eq!(strategy.len(), 1);
    }

    #[test]
    fn test_release() {
        let mut strategy = FixedPortStrategy::new(UdpEndpoint::new("127.0.0.1", 8125));
        strategy.allocate(&"a".into(), &executor()).unwrap();

        assert_eq!(
            strategy.release(&"a".into()),
            Some(UdpEndpoint::new("127.0.0.1", 8125))
        );
        assert_eq!(strategy.release(&"a".into()), None);
        assert_eq!(strategy.endpoint_of(&"a".into()), None);
    }
}
