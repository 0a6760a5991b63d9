//! Startup reconciliation of recovered containers against the persisted record.
//!
//! | recovered | on disk | action |
//! |-----------|---------|--------------------------------------------|
//! | yes       | yes     | rebind to the persisted endpoint           |
//! | yes       | no      | allocate a fresh endpoint and persist it   |
//! | no        | yes     | release the endpoint and drop the record   |
//! | no        | no      | nothing to act on                          |

use std::collections::{HashMap, HashSet};

use tracing::{error, info, warn};

use super::Collaborators;
use crate::domain::{ContainerId, ContainerState, ExecutorInfo, UdpEndpoint};
use crate::strategy::StrategyError;

/// Per-outcome counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    /// Recovered containers rebound to their persisted endpoint.
    pub rebound: usize,
    /// Recovered containers given a fresh endpoint.
    pub allocated: usize,
    /// Stale records released and removed.
    pub released: usize,
    /// Recovered containers left without an endpoint.
    pub failed: usize,
    /// Repeated entries in the recovered list.
    pub duplicates: usize,
}

pub(super) fn reconcile(c: &mut Collaborators, recovered: Vec<ContainerState>) -> RecoverySummary {
    let location = c.state_cache.backing_location();
    let mut on_disk = match c.state_cache.load_all() {
        Ok(entries) => entries,
        Err(e) => {
            error!(
                location = %location,
                error = %e,
                "Failed to load persisted endpoints, recovering as if none were stored"
            );
            HashMap::new()
        }
    };

    info!(
        location = %location,
        recovered = recovered.len(),
        on_disk = on_disk.len(),
        "Recovering containers"
    );

    let mut summary = RecoverySummary::default();
    let mut seen = HashSet::with_capacity(recovered.len());
    let mut pending = Vec::new();

    // Every persisted endpoint is rebound, and every stale one released,
    // before anything new is allocated. A fresh allocation must never claim
    // a port a recovered container still holds on disk.
    for ContainerState {
        container_id,
        executor_info,
    } in recovered
    {
        if !seen.insert(container_id.clone()) {
            warn!(container_id = %container_id, "Container listed twice in recovery, ignoring repeat");
            summary.duplicates += 1;
            continue;
        }

        match on_disk.remove(&container_id) {
            Some(endpoint) => {
                if !rebind(c, &container_id, &executor_info, endpoint, &mut summary) {
                    pending.push(Pending {
                        container_id,
                        executor_info,
                        has_record: true,
                    });
                }
            }
            None => pending.push(Pending {
                container_id,
                executor_info,
                has_record: false,
            }),
        }
    }

    for (container_id, endpoint) in on_disk {
        let was_bound = c.strategy.release(&container_id).is_some();
        info!(
            container_id = %container_id,
            endpoint = %endpoint,
            was_bound,
            "Dropping stale endpoint record"
        );
        if let Err(e) = c.state_cache.remove(&container_id) {
            warn!(container_id = %container_id, error = %e, "Failed to remove stale endpoint record");
        }
        summary.released += 1;
    }

    for Pending {
        container_id,
        executor_info,
        has_record,
    } in pending
    {
        if c.register(&container_id, &executor_info).is_ok() {
            summary.allocated += 1;
            continue;
        }

        // register() already logged why.
        summary.failed += 1;
        // Nothing is bound, so a rejected record must not outlive this pass.
        if has_record && let Err(e) = c.state_cache.remove(&container_id) {
            warn!(container_id = %container_id, error = %e, "Failed to remove rejected endpoint record");
        }
    }

    info!(
        rebound = summary.rebound,
        allocated = summary.allocated,
        released = summary.released,
        failed = summary.failed,
        duplicates = summary.duplicates,
        "Container recovery complete"
    );
    summary
}

/// A recovered container still waiting for an endpoint.
struct Pending {
    container_id: ContainerId,
    executor_info: ExecutorInfo,
    /// The persisted record was rejected and has to be cleaned up if no new
    /// endpoint can be allocated.
    has_record: bool,
}

/// Rebind to the persisted endpoint. Returns `false` when the strategy
/// refuses it and the container needs a fresh allocation.
fn rebind(
    c: &mut Collaborators,
    container_id: &ContainerId,
    executor: &ExecutorInfo,
    endpoint: UdpEndpoint,
    summary: &mut RecoverySummary,
) -> bool {
    let persisted = endpoint.to_string();
    match c.strategy.bind_existing(container_id, executor, endpoint) {
        Ok(()) => {
            info!(container_id = %container_id, endpoint = %persisted, "Rebound recovered container");
            summary.rebound += 1;
            true
        }
        Err(StrategyError::AlreadyRegistered(_)) => {
            // Already live on another endpoint; the record follows the strategy.
            let Some(current) = c.strategy.endpoint_of(container_id) else {
                return false;
            };
            warn!(
                container_id = %container_id,
                persisted = %persisted,
                current = %current,
                "Persisted endpoint differs from the live assignment, keeping the live one"
            );
            if let Err(e) = c.state_cache.insert(container_id, &current) {
                warn!(container_id = %container_id, error = %e, "Failed to persist live endpoint");
            }
            summary.rebound += 1;
            true
        }
        Err(e) => {
            warn!(
                container_id = %container_id,
                endpoint = %persisted,
                error = %e,
                "Persisted endpoint rejected, allocating a new one"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use io_runner::InlineRunner;
    use mockall::predicate::eq;

    use crate::assigner::InputAssigner;
    use crate::domain::{ContainerEndpoints, ContainerId, ContainerState, ExecutorInfo, UdpEndpoint};
    use crate::state_cache::{MemoryStateCache, MockStateCache, StateCache, StateCacheError};
    use crate::strategy::{MockInputStrategy, PortRangeStrategy, StrategyError};
    use crate::test_utils::init_tracing;

    use super::RecoverySummary;

    fn container_state(cid: &str, fid: &str, eid: &str) -> ContainerState {
        ContainerState::new(cid, ExecutorInfo::new(fid, eid))
    }

    fn mock_strategy() -> MockInputStrategy {
        let mut strategy = MockInputStrategy::new();
        strategy.expect_name().return_const("mock");
        strategy.expect_endpoint_of().returning(|_| None);
        strategy
    }

    fn mock_state_cache(disk: ContainerEndpoints) -> MockStateCache {
        let mut cache = MockStateCache::new();
        cache
            .expect_backing_location()
            .return_const("SOME PATH".to_string());
        cache
            .expect_load_all()
            .times(1)
            .returning(move || Ok(disk.clone()));
        cache
    }

    fn initialized(strategy: MockInputStrategy, cache: MockStateCache) -> InputAssigner {
        let assigner = InputAssigner::new();
        assigner.init(Arc::new(InlineRunner), Box::new(cache), Box::new(strategy));
        assigner
    }

    #[test]
    fn test_recovery_truth_table() {
        init_tracing();
        // recovered: YY, YN; disk: YY -> host1:1, NY -> host3:2
        let recover_input = vec![
            container_state("YY", "fid1", "eid1"),
            container_state("YN", "fid2", "eid2"),
        ];
        let disk_input: ContainerEndpoints = [
            (ContainerId::new("YY"), UdpEndpoint::new("host1", 1)),
            (ContainerId::new("NY"), UdpEndpoint::new("host3", 2)),
        ]
        .into_iter()
        .collect();

        let mut strategy = mock_strategy();
        let mut cache = mock_state_cache(disk_input);

        // Recovered and on disk: rebind, no new allocation, no cache write.
        strategy
            .expect_bind_existing()
            .withf(|id, info, endpoint| {
                id.as_str() == "YY"
                    && info == &ExecutorInfo::new("fid1", "eid1")
                    && endpoint == &UdpEndpoint::new("host1", 1)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        // Recovered only: fresh allocation, persisted.
        strategy
            .expect_allocate()
            .withf(|id, info| id.as_str() == "YN" && info == &ExecutorInfo::new("fid2", "eid2"))
            .times(1)
            .returning(|_, _| Ok(UdpEndpoint::new("host2", 2)));
        cache
            .expect_insert()
            .with(eq(ContainerId::new("YN")), eq(UdpEndpoint::new("host2", 2)))
            .times(1)
            .returning(|_, _| Ok(()));

        // On disk only: released and removed.
        strategy
            .expect_release()
            .with(eq(ContainerId::new("NY")))
            .times(1)
            .returning(|_| Some(UdpEndpoint::new("host3", 2)));
        cache
            .expect_remove()
            .with(eq(ContainerId::new("NY")))
            .times(1)
            .returning(|_| Ok(()));

        let assigner = initialized(strategy, cache);
        let summary = assigner.recover_containers(&recover_input).unwrap();

        assert_eq!(
            summary,
            RecoverySummary {
                rebound: 1,
                allocated: 1,
                released: 1,
                failed: 0,
                duplicates: 0,
            }
        );
    }

    #[test]
    fn test_recovery_with_unreadable_state_allocates_everything() {
        init_tracing();
        let mut strategy = mock_strategy();
        let mut cache = MockStateCache::new();
        cache
            .expect_backing_location()
            .return_const("SOME PATH".to_string());
        cache.expect_load_all().times(1).returning(|| {
            Err(StateCacheError::UnsupportedVersion(9))
        });

        strategy
            .expect_allocate()
            .times(2)
            .returning(|_, _| Ok(UdpEndpoint::new("host", 1)));
        strategy.expect_bind_existing().never();
        cache.expect_insert().times(2).returning(|_, _| Ok(()));

        let assigner = initialized(strategy, cache);
        let summary = assigner
            .recover_containers(&[
                container_state("a", "f", "e"),
                container_state("b", "f", "e"),
            ])
            .unwrap();

        assert_eq!(summary.allocated, 2);
    }

    #[test]
    fn test_rejected_rebind_falls_back_to_allocation() {
        init_tracing();
        let disk: ContainerEndpoints = [(ContainerId::new("a"), UdpEndpoint::new("old", 1))]
            .into_iter()
            .collect();
        let mut strategy = mock_strategy();
        let mut cache = mock_state_cache(disk);

        strategy.expect_bind_existing().times(1).returning(|_, _, endpoint| {
            Err(StrategyError::EndpointMismatch {
                expected: UdpEndpoint::new("new", 1),
                actual: endpoint,
            })
        });
        strategy
            .expect_allocate()
            .times(1)
            .returning(|_, _| Ok(UdpEndpoint::new("new", 1)));
        cache
            .expect_insert()
            .with(eq(ContainerId::new("a")), eq(UdpEndpoint::new("new", 1)))
            .times(1)
            .returning(|_, _| Ok(()));
        cache.expect_remove().never();

        let assigner = initialized(strategy, cache);
        let summary = assigner
            .recover_containers(&[container_state("a", "f", "e")])
            .unwrap();

        assert_eq!(summary.allocated, 1);
        assert_eq!(summary.rebound, 0);
    }

    #[test]
    fn test_failed_fallback_drops_record() {
        init_tracing();
        let disk: ContainerEndpoints = [(ContainerId::new("a"), UdpEndpoint::new("old", 1))]
            .into_iter()
            .collect();
        let mut strategy = mock_strategy();
        let mut cache = mock_state_cache(disk);

        strategy.expect_bind_existing().times(1).returning(|_, _, _| {
            Err(StrategyError::PortOutOfRange {
                port: 1,
                start: 9000,
                end: 9001,
            })
        });
        strategy.expect_allocate().times(1).returning(|_, _| {
            Err(StrategyError::PortsExhausted {
                start: 9000,
                end: 9001,
            })
        });
        cache.expect_insert().never();
        cache
            .expect_remove()
            .with(eq(ContainerId::new("a")))
            .times(1)
            .returning(|_| Ok(()));

        let assigner = initialized(strategy, cache);
        let summary = assigner
            .recover_containers(&[container_state("a", "f", "e")])
            .unwrap();

        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_duplicate_recovered_entries_are_skipped() {
        init_tracing();
        let mut strategy = mock_strategy();
        let mut cache = mock_state_cache(ContainerEndpoints::new());

        strategy
            .expect_allocate()
            .times(1)
            .returning(|_, _| Ok(UdpEndpoint::new("host", 1)));
        cache.expect_insert().times(1).returning(|_, _| Ok(()));

        let assigner = initialized(strategy, cache);
        let summary = assigner
            .recover_containers(&[
                container_state("a", "f", "e"),
                container_state("a", "f", "e"),
            ])
            .unwrap();

        assert_eq!(summary.allocated, 1);
        assert_eq!(summary.duplicates, 1);
    }

    #[test]
    fn test_fresh_allocation_skips_persisted_ports() {
        init_tracing();
        let cache = MemoryStateCache::with_entries(
            [(ContainerId::new("b"), UdpEndpoint::new("127.0.0.1", 9000))]
                .into_iter()
                .collect(),
        );
        let assigner = InputAssigner::new();
        assigner.init(
            Arc::new(InlineRunner),
            Box::new(cache.clone()),
            Box::new(PortRangeStrategy::new("127.0.0.1", 9000, 9001).unwrap()),
        );

        let summary = assigner
            .recover_containers(&[container_state("a", "f", "e"), container_state("b", "f", "e")])
            .unwrap();

        assert_eq!(summary.rebound, 1);
        assert_eq!(summary.allocated, 1);
        let entries = cache.snapshot();
        assert_eq!(entries[&ContainerId::new("a")].port, 9001);
        assert_eq!(entries[&ContainerId::new("b")].port, 9000);
    }

    #[test]
    fn test_rejected_record_cannot_take_a_valid_persisted_port() {
        init_tracing();
        let cache = MemoryStateCache::with_entries(
            [
                (ContainerId::new("a"), UdpEndpoint::new("127.0.0.1", 5)),
                (ContainerId::new("b"), UdpEndpoint::new("127.0.0.1", 9000)),
            ]
            .into_iter()
            .collect(),
        );
        let assigner = InputAssigner::new();
        assigner.init(
            Arc::new(InlineRunner),
            Box::new(cache.clone()),
            Box::new(PortRangeStrategy::new("127.0.0.1", 9000, 9000).unwrap()),
        );

        let summary = assigner
            .recover_containers(&[container_state("a", "f", "e"), container_state("b", "f", "e")])
            .unwrap();

        assert_eq!(
            summary,
            RecoverySummary {
                rebound: 1,
                allocated: 0,
                released: 0,
                failed: 1,
                duplicates: 0,
            }
        );
        let entries = cache.snapshot();
        assert_eq!(
            entries.get(&ContainerId::new("b")),
            Some(&UdpEndpoint::new("127.0.0.1", 9000))
        );
        assert!(!entries.contains_key(&ContainerId::new("a")));
        assert_eq!(assigner.container_endpoint(&ContainerId::new("a")).unwrap(), None);
    }

    #[test]
    fn test_rejected_record_falls_back_after_stale_release() {
        init_tracing();
        let cache = MemoryStateCache::with_entries(
            [
                (ContainerId::new("a"), UdpEndpoint::new("127.0.0.1", 5)),
                (ContainerId::new("b"), UdpEndpoint::new("127.0.0.1", 9000)),
                (ContainerId::new("gone"), UdpEndpoint::new("127.0.0.1", 9001)),
            ]
            .into_iter()
            .collect(),
        );
        let assigner = InputAssigner::new();
        assigner.init(
            Arc::new(InlineRunner),
            Box::new(cache.clone()),
            Box::new(PortRangeStrategy::new("127.0.0.1", 9000, 9001).unwrap()),
        );

        let summary = assigner
            .recover_containers(&[container_state("a", "f", "e"), container_state("b", "f", "e")])
            .unwrap();

        assert_eq!(summary.rebound, 1);
        assert_eq!(summary.allocated, 1);
        assert_eq!(summary.released, 1);
        let entries = cache.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[&ContainerId::new("a")].port, 9001);
        assert_eq!(entries[&ContainerId::new("b")].port, 9000);
    }

    #[test]
    fn test_live_assignment_wins_over_differing_record() {
        init_tracing();
        let mut cache = MemoryStateCache::new();
        let assigner = InputAssigner::new();
        assigner.init(
            Arc::new(InlineRunner),
            Box::new(cache.clone()),
            Box::new(PortRangeStrategy::new("127.0.0.1", 9000, 9005).unwrap()),
        );
        let live = assigner
            .register_container(&ContainerId::new("a"), &ExecutorInfo::new("f", "e"))
            .unwrap();
        cache
            .insert(&ContainerId::new("a"), &UdpEndpoint::new("127.0.0.1", 9003))
            .unwrap();

        let summary = assigner
            .recover_containers(&[container_state("a", "f", "e")])
            .unwrap();

        assert_eq!(summary.rebound, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(cache.snapshot().get(&ContainerId::new("a")), Some(&live));
    }

    #[test]
    fn test_repeated_recovery_is_stable() {
        init_tracing();
        let cache = MemoryStateCache::with_entries(
            [(ContainerId::new("a"), UdpEndpoint::new("127.0.0.1", 9001))]
                .into_iter()
                .collect(),
        );
        let assigner = InputAssigner::new();
        assigner.init(
            Arc::new(InlineRunner),
            Box::new(cache.clone()),
            Box::new(PortRangeStrategy::new("127.0.0.1", 9000, 9005).unwrap()),
        );
        let live = [container_state("a", "f", "e"), container_state("b", "f", "e")];

        let first = assigner.recover_containers(&live).unwrap();
        let after_first = cache.snapshot();
        let second = assigner.recover_containers(&live).unwrap();

        assert_eq!(first.rebound, 1);
        assert_eq!(first.allocated, 1);
        assert_eq!(second.rebound, 2);
        assert_eq!(second.allocated, 0);
        assert_eq!(cache.snapshot(), after_first);
        assert_eq!(
            after_first.get(&ContainerId::new("a")),
            Some(&UdpEndpoint::new("127.0.0.1", 9001))
        );
        assert_eq!(
            after_first.get(&ContainerId::new("b")),
            Some(&UdpEndpoint::new("127.0.0.1", 9000))
        );
    }
}
