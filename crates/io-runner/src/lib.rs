//! # IO Runner
//!
//! A serialized execution context. Work units handed to a [`Runner`] execute
//! one at a time, in the order the runner accepted them, no matter which
//! thread submitted them.
//!
//! ## Provided runners
//!
//! - [`IoRunner`]: a dedicated worker thread draining an unbounded channel
//! - [`InlineRunner`]: runs each unit on the submitting thread
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

use thiserror::Error;

mod inline;
mod io_runner;
#[cfg(test)]
mod test_utils;

pub use inline::InlineRunner;
pub use io_runner::{IoRunner, RunnerStats};

/// A unit of work submitted to a runner.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Errors reported by a runner when accepting work.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Runner has stopped accepting work")]
    Stopped,

    #[error("Failed to spawn runner thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A single logical serialized execution context.
///
/// Implementations guarantee that accepted work runs strictly one unit at a
/// time and in acceptance order. Rejected work is dropped, never run.
pub trait Runner: Send + Sync {
    /// Accept a unit of work for eventual execution.
    fn dispatch(&self, work: Work) -> Result<(), RunnerError>;

    /// Whether the current thread is the one executing this runner's work.
    ///
    /// Callers that block on dispatched work use this to detect re-entrant
    /// submission, which would otherwise deadlock.
    fn in_serial_context(&self) -> bool {
        false
    }
}
