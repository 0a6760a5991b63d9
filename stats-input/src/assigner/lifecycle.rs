//! Init-once lifecycle flag readable from any thread.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Uninitialized = 0,
    /// `init` is binding collaborators.
    Initializing = 1,
    Initialized = 2,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            _ => Self::Initialized,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Uninitialized as u8))
    }

    /// Claim the one-time transition out of `Uninitialized`.
    ///
    /// Returns `false` if another `init` already claimed it.
    pub(crate) fn begin_init(&self) -> bool {
        self.0
            .compare_exchange(
                LifecycleState::Uninitialized as u8,
                LifecycleState::Initializing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn finish_init(&self) {
        self.0
            .store(LifecycleState::Initialized as u8, Ordering::Release);
    }

    pub(crate) fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.state() == LifecycleState::Initialized
    }
}
