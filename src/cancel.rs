//! Shared cancellation flag for a bundle run.
//!
//! Cancellation is cooperative and coarse: each worker looks at the flag once,
//! right before it would launch the renderer. URLs that have not started yet
//! are skipped; renderer processes that are already running finish normally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable handle to one cancellation flag.
///
/// Every clone observes the same flag, so a handle can be moved into a
/// signal handler while the run holds another.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }

    /// Clear the flag so the same handle can drive another run.
    pub fn reset(&self) {
        self.inner.store(false, Ordering::SeqCst);
    }
}
