//! Dedicated-thread runner.
//!
//! Work is queued on an unbounded MPSC channel and drained by a single named
//! OS thread using `blocking_recv`, so acceptance order is execution order.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{Runner, RunnerError, Work};

#[derive(Debug, Default)]
struct Counters {
    executed: AtomicU64,
    panicked: AtomicU64,
}

/// Snapshot of runner activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerStats {
    /// Work units that have finished, including ones that panicked.
    pub executed: u64,
    /// Work units that panicked.
    pub panicked: u64,
}

/// A serialized execution context backed by one worker thread.
///
/// A work unit that panics is caught and logged; the worker keeps serving
/// later units. Dropping the runner closes the queue, lets already accepted
/// work drain, and joins the worker.
pub struct IoRunner {
    name: String,
    sender: RwLock<Option<mpsc::UnboundedSender<Work>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    counters: Arc<Counters>,
}

impl IoRunner {
    /// Spawn the worker thread and start accepting work.
    pub fn start(name: impl Into<String>) -> Result<Self, RunnerError> {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel::<Work>();
        let counters = Arc::new(Counters::default());

        let worker = {
            let thread_name = name.clone();
            let counters = counters.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_worker(&thread_name, rx, &counters))
                .map_err(|source| RunnerError::Spawn {
                    name: name.clone(),
                    source,
                })?
        };

        info!(runner = %name, "Runner started");

        Ok(Self {
            worker_id: worker.thread().id(),
            name,
            sender: RwLock::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            counters,
        })
    }

    /// Name of the worker thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the runner still accepts work.
    pub fn is_running(&self) -> bool {
        self.sender.read().is_some()
    }

    pub fn stats(&self) -> RunnerStats {
        RunnerStats {
            executed: self.counters.executed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting work, drain what was already accepted, and join the
    /// worker thread.
    ///
    /// Calling this from inside a work unit only closes the queue; the join
    /// is skipped because the worker cannot wait on itself.
    pub fn shutdown(&self) {
        if self.sender.write().take().is_none() {
            return;
        }
        debug!(runner = %self.name, "Runner closing");

        if self.in_serial_context() {
            warn!(runner = %self.name, "Runner shutdown requested from its own worker");
            return;
        }

        if let Some(worker) = self.worker.lock().take()
            && worker.join().is_err()
        {
            error!(runner = %self.name, "Runner worker terminated abnormally");
        }
    }
}

impl Runner for IoRunner {
    fn dispatch(&self, work: Work) -> Result<(), RunnerError> {
        let sender = self.sender.read();
        let Some(tx) = sender.as_ref() else {
            return Err(RunnerError::Stopped);
        };
        tx.send(work).map_err(|_| RunnerError::Stopped)
    }

    fn in_serial_context(&self) -> bool {
        thread::current().id() == self.worker_id
    }
}

impl Drop for IoRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for IoRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoRunner")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

fn run_worker(name: &str, mut rx: mpsc::UnboundedReceiver<Work>, counters: &Counters) {
    while let Some(work) = rx.blocking_recv() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            error!(
                runner = name,
                panic = %panic_message(payload.as_ref()),
                "Work unit panicked"
            );
        }
        counters.executed.fetch_add(1, Ordering::Relaxed);
    }

    info!(
        runner = name,
        executed = counters.executed.load(Ordering::Relaxed),
        "Runner stopped"
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "<non-string panic payload>".to_string()
}
