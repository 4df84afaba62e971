//! Cooperative cancellation for query execution.
//!
//! Every `execute` call takes a token; all loops over storage results or
//! binding rows check it between rows. Timeouts compose through the same
//! token via an optional deadline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::{Error, Result};

/// Shared cancellation flag with an optional deadline.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// A token that never expires and starts uncancelled.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner { cancelled: AtomicBool::new(false), deadline: None }),
        }
    }

    /// A token that cancels itself once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: Some(Instant::now() + timeout),
            }),
        }
    }

    /// Request cancellation. Idempotent; visible to all clones.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
            || self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Row-boundary check: error out if cancelled or past the deadline.
    pub fn check(&self) -> Result<()> {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return Err(Error::Cancelled("cancellation requested".into()));
        }
        if self.inner.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Cancelled("deadline exceeded".into()));
        }
        Ok(())
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
