use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit and restart flags shared by the worker, the engine and the store's
/// progress handler. Writers change them while holding the queue lock so a
/// sleeping worker never misses a wake.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    exit: Arc<AtomicBool>,
    restart: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for one-shot runs that nobody cancels.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.exit.store(true, Ordering::Release);
    }

    pub fn is_exit(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    pub fn request_restart(&self) {
        self.restart.store(true, Ordering::Release);
    }

    pub fn clear_restart(&self) {
        self.restart.store(false, Ordering::Release);
    }

    pub fn is_restart_requested(&self) -> bool {
        self.restart.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.is_exit() || self.is_restart_requested()
    }

    pub(crate) fn exit_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.exit)
    }
}
