//! Input assigner: the authority for which endpoint each container uses.
//!
//! The assigner owns no allocation logic. Every operation that touches the
//! strategy or the state cache is packaged as a work unit and dispatched to
//! the [`Runner`]; the calling thread blocks on a oneshot channel until that
//! unit has run. The runner executes units one at a time in acceptance order,
//! so concurrent callers observe a single total order.
//!
//! Misuse of the lifecycle (any operation before [`InputAssigner::init`],
//! `init` twice, or an operation issued from inside the runner's own context)
//! is a wiring bug in the host and panics. Runtime failures are returned.

mod lifecycle;
mod recovery;

use std::sync::{Arc, OnceLock};

use io_runner::{Runner, RunnerError};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::domain::{ContainerId, ContainerState, ExecutorInfo, UdpEndpoint};
use crate::state_cache::{StateCache, StateCacheError};
use crate::strategy::{InputStrategy, StrategyError};

pub use lifecycle::LifecycleState;
pub use recovery::RecoverySummary;

use lifecycle::Lifecycle;

/// Operational failures returned to callers.
#[derive(Debug, Error)]
pub enum AssignerError {
    #[error("Container {0} is already registered")]
    AlreadyRegistered(ContainerId),

    #[error("Endpoint allocation failed for container {container_id}: {source}")]
    Strategy {
        container_id: ContainerId,
        #[source]
        source: StrategyError,
    },

    #[error("Failed to persist endpoint for container {container_id}: {source}")]
    StateCache {
        container_id: ContainerId,
        #[source]
        source: StateCacheError,
    },

    #[error("Runner rejected {operation}(): {source}")]
    Runner {
        operation: &'static str,
        #[source]
        source: RunnerError,
    },

    #[error("{operation}() work was dropped before completing")]
    WorkAbandoned { operation: &'static str },
}

impl AssignerError {
    fn from_strategy(container_id: &ContainerId, source: StrategyError) -> Self {
        match source {
            StrategyError::AlreadyRegistered(id) => Self::AlreadyRegistered(id),
            source => Self::Strategy {
                container_id: container_id.clone(),
                source,
            },
        }
    }
}

/// The shared allocation state. Only work units running on the runner lock
/// this.
pub(crate) struct Collaborators {
    pub(crate) strategy: Box<dyn InputStrategy>,
    pub(crate) state_cache: Box<dyn StateCache>,
}

impl Collaborators {
    /// Allocate and persist, or change nothing. A container that already
    /// holds an endpoint is refused before the strategy allocates.
    pub(crate) fn register(
        &mut self,
        container_id: &ContainerId,
        executor: &ExecutorInfo,
    ) -> Result<UdpEndpoint, AssignerError> {
        if let Some(existing) = self.strategy.endpoint_of(container_id) {
            warn!(
                container_id = %container_id,
                endpoint = %existing,
                "Container is already registered"
            );
            return Err(AssignerError::AlreadyRegistered(container_id.clone()));
        }

        let endpoint = match self.strategy.allocate(container_id, executor) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(
                    container_id = %container_id,
                    strategy = self.strategy.name(),
                    error = %e,
                    "Endpoint allocation failed"
                );
                return Err(AssignerError::from_strategy(container_id, e));
            }
        };

        if let Err(source) = self.state_cache.insert(container_id, &endpoint) {
            error!(
                container_id = %container_id,
                endpoint = %endpoint,
                error = %source,
                "Failed to persist endpoint, releasing allocation"
            );
            self.strategy.release(container_id);
            return Err(AssignerError::StateCache {
                container_id: container_id.clone(),
                source,
            });
        }

        info!(
            container_id = %container_id,
            endpoint = %endpoint,
            framework_id = %executor.framework_id,
            executor_id = %executor.executor_id,
            "Registered container"
        );
        Ok(endpoint)
    }

    pub(crate) fn unregister(&mut self, container_id: &ContainerId) {
        match self.strategy.release(container_id) {
            Some(endpoint) => {
                info!(container_id = %container_id, endpoint = %endpoint, "Unregistered container")
            }
            None => warn!(container_id = %container_id, "Unregistering unknown container"),
        }

        if let Err(e) = self.state_cache.remove(container_id) {
            warn!(container_id = %container_id, error = %e, "Failed to remove persisted endpoint");
        }
    }
}

struct Bound {
    runner: Arc<dyn Runner>,
    collaborators: Arc<Mutex<Collaborators>>,
}

/// Assigns telemetry endpoints to containers.
///
/// Safe to share across any number of threads. Create one per process, call
/// [`init`](Self::init) once, then use the other operations freely.
///
/// The blocking operations wait on the runner and must not be called from
/// inside an async runtime's worker thread.
pub struct InputAssigner {
    lifecycle: Lifecycle,
    bound: OnceLock<Bound>,
}

impl InputAssigner {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            bound: OnceLock::new(),
        }
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Bind the runner, state cache, and strategy.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn init(
        &self,
        runner: Arc<dyn Runner>,
        state_cache: Box<dyn StateCache>,
        strategy: Box<dyn InputStrategy>,
    ) {
        if !self.lifecycle.begin_init() {
            panic!("init() was called twice");
        }

        info!(
            strategy = strategy.name(),
            location = %state_cache.backing_location(),
            "Input assigner initialized"
        );

        let bound = Bound {
            runner,
            collaborators: Arc::new(Mutex::new(Collaborators {
                strategy,
                state_cache,
            })),
        };
        if self.bound.set(bound).is_err() {
            panic!("init() was called twice");
        }
        self.lifecycle.finish_init();
    }

    /// Allocate an endpoint for `container_id` and persist it.
    ///
    /// On success the assignment is on record and visible to
    /// [`container_endpoint`](Self::container_endpoint) before this returns.
    /// On failure nothing was allocated or persisted.
    pub fn register_container(
        &self,
        container_id: &ContainerId,
        executor: &ExecutorInfo,
    ) -> Result<UdpEndpoint, AssignerError> {
        let container_id = container_id.clone();
        let executor = executor.clone();
        self.run_serialized("register_container", move |c| {
            c.register(&container_id, &executor)
        })?
    }

    /// Release the endpoint held by `container_id` and forget it.
    ///
    /// Unknown containers are logged and otherwise ignored; unregistration
    /// routinely races with container teardown.
    pub fn unregister_container(&self, container_id: &ContainerId) {
        let id = container_id.clone();
        if let Err(e) = self.run_serialized("unregister_container", move |c| c.unregister(&id)) {
            error!(container_id = %container_id, error = %e, "Unregistration did not run");
        }
    }

    /// Reconcile the containers the agent recovered with the persisted record.
    ///
    /// See [`RecoverySummary`] for what each outcome means.
    pub fn recover_containers(
        &self,
        containers: &[ContainerState],
    ) -> Result<RecoverySummary, AssignerError> {
        let containers = containers.to_vec();
        self.run_serialized("recover_containers", move |c| {
            recovery::reconcile(c, containers)
        })
    }

    /// Endpoint currently assigned to `container_id`.
    pub fn container_endpoint(
        &self,
        container_id: &ContainerId,
    ) -> Result<Option<UdpEndpoint>, AssignerError> {
        let container_id = container_id.clone();
        self.run_serialized("container_endpoint", move |c| {
            c.strategy.endpoint_of(&container_id)
        })
    }

    fn bound(&self, operation: &'static str) -> &Bound {
        let bound = match (self.lifecycle.is_initialized(), self.bound.get()) {
            (true, Some(bound)) => bound,
            _ => panic!("init() wasn't called before {operation}()"),
        };
        if bound.runner.in_serial_context() {
            panic!("{operation}() was called from inside the runner's serialized context");
        }
        bound
    }

    /// Run `work` on the runner and block until it has finished.
    fn run_serialized<T, F>(&self, operation: &'static str, work: F) -> Result<T, AssignerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Collaborators) -> T + Send + 'static,
    {
        let bound = self.bound(operation);
        let collaborators = bound.collaborators.clone();
        let (tx, rx) = oneshot::channel();

        bound
            .runner
            .dispatch(Box::new(move || {
                let mut collaborators = collaborators.lock();
                let _ = tx.send(work(&mut collaborators));
            }))
            .map_err(|source| AssignerError::Runner { operation, source })?;

        debug!(operation, "Waiting for serialized work");
        rx.blocking_recv()
            .map_err(|_| AssignerError::WorkAbandoned { operation })
    }
}

impl Default for InputAssigner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InputAssigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputAssigner")
            .field("lifecycle", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}
