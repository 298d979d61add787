//! Cooperative cancellation of a running build.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Handle for cooperative cancellation of one build.
///
/// `CancelToken` is a thread-safe flag that can be cloned and shared; any
/// clone can trigger the cancellation, which is visible to all other clones.
/// The build worker checks it once per streaming-loop iteration, so the
/// latency of a cancellation is bounded by the task poll interval.
///
/// # Example
///
/// ```
/// use minion_core::execute::CancelToken;
///
/// let token = CancelToken::new();
/// let clone = token.clone();
///
/// assert!(!token.is_cancelled());
/// clone.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
