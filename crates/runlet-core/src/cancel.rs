//! Cooperative cancellation for the resolve/compile/execute pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Handle for cooperative cancellation of an invocation.
///
/// `AbortHandle` is a thread-safe flag that can be cloned and shared across
/// threads; any clone can trigger the abort, and all clones observe it. It is
/// threaded through every resolution branch and checked between pipeline
/// phases, so work in flight when cancellation fires surfaces a distinct
/// cancelled outcome rather than a generic failure.
#[derive(Clone, Default, Debug)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Create a new abort handle.
    pub fn new() -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Request abort of the invocation.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// Reset the abort flag before reusing the handle for a new invocation.
    pub fn reset(&self) {
        self.aborted.store(false, Ordering::Relaxed);
    }

    /// Return `Error::Cancelled` if abort has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let handle = AbortHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_aborted());

        clone.abort();
        assert!(handle.is_aborted());
        assert!(handle.check().unwrap_err().is_cancelled());
    }

    #[test]
    fn reset_clears_abort() {
        let handle = AbortHandle::new();
        handle.abort();
        handle.reset();
        assert!(handle.check().is_ok());
    }
}
