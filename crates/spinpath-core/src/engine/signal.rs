use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// External stop request, polled cooperatively once per iteration.
///
/// Clones share the same underlying flag, so a controller thread can hold
/// one clone while the iteration loop observes another. Cancellation is
/// never preemptive.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
