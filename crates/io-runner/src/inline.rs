use crate::{Runner, RunnerError, Work};

/// Runs every work unit immediately on the submitting thread.
///
/// This runner provides no serialization of its own: concurrent submitters
/// run concurrently. It suits single-threaded hosts and test wiring where the
/// caller already serializes access.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineRunner;

impl InlineRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Runner for InlineRunner {
    fn dispatch(&self, work: Work) -> Result<(), RunnerError> {
        work();
        Ok(())
    }
}
