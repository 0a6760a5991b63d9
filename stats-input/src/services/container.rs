//! Service container for dependency injection.
//!
//! The AssignerServices holds the assigner together with the runner that
//! serializes its work, and manages their lifecycle.

use std::sync::Arc;

use io_runner::{IoRunner, RunnerStats};
use tracing::info;

use crate::assigner::{InputAssigner, RecoverySummary};
use crate::config::{AssignerConfig, PortMode};
use crate::domain::{ContainerState, UdpEndpoint};
use crate::state_cache::{FileStateCache, MemoryStateCache, StateCache};
use crate::strategy::{FixedPortStrategy, InputStrategy, PortRangeStrategy};
use crate::Result;

/// A fully wired, initialized assigner.
pub struct AssignerServices {
    /// The initialized assigner, shareable across threads.
    pub assigner: Arc<InputAssigner>,
    runner: Arc<IoRunner>,
}

impl AssignerServices {
    /// Validate `config`, start the runner, build the collaborators, and
    /// initialize the assigner.
    pub fn from_config(config: &AssignerConfig) -> Result<Self> {
        config.validate()?;
        info!(
            mode = %config.port_mode,
            host = %config.host,
            "Initializing input assigner services"
        );

        let strategy = build_strategy(config)?;
        let state_cache = build_state_cache(config)?;
        let runner = Arc::new(IoRunner::start(config.runner_name.clone())?);

        let assigner = Arc::new(InputAssigner::new());
        assigner.init(runner.clone(), state_cache, strategy);

        Ok(Self { assigner, runner })
    }

    /// Reconcile the containers the agent recovered with the persisted
    /// record. Hosts call this once at startup, before new registrations.
    pub fn recover(&self, containers: &[ContainerState]) -> Result<RecoverySummary> {
        let summary = self.assigner.recover_containers(containers)?;
        info!(
            recovered = containers.len(),
            rebound = summary.rebound,
            allocated = summary.allocated,
            "Startup recovery finished"
        );
        Ok(summary)
    }

    pub fn runner_stats(&self) -> RunnerStats {
        self.runner.stats()
    }

    /// Stop the runner after it drains accepted work.
    ///
    /// Later assigner calls fail with a runner error instead of blocking.
    pub fn shutdown(&self) {
        info!("Shutting down input assigner services");
        self.runner.shutdown();
    }
}

fn build_strategy(config: &AssignerConfig) -> Result<Box<dyn InputStrategy>> {
    let strategy: Box<dyn InputStrategy> = match config.port_mode {
        PortMode::Single => Box::new(FixedPortStrategy::new(UdpEndpoint::new(
            config.host.clone(),
            config.port,
        ))),
        PortMode::Range => Box::new(PortRangeStrategy::new(
            config.host.clone(),
            config.port_range_start,
            config.port_range_end,
        )?),
    };
    Ok(strategy)
}

fn build_state_cache(config: &AssignerConfig) -> Result<Box<dyn StateCache>> {
    let cache: Box<dyn StateCache> = match &config.state_dir {
        Some(dir) => Box::new(FileStateCache::open(dir)?),
        None => Box::new(MemoryStateCache::new()),
    };
    Ok(cache)
}
