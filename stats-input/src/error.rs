//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::assigner::AssignerError;
use crate::state_cache::StateCacheError;
use crate::strategy::StrategyError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Assigner error: {0}")]
    Assigner(#[from] AssignerError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("State cache error: {0}")]
    StateCache(#[from] StateCacheError),

    #[error("Runner error: {0}")]
    Runner(#[from] io_runner::RunnerError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error while {op} at {path}: {source}")]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}
