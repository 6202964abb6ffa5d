//! Concurrency gate for limiting outstanding calls per key

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::context::Context;
use crate::error::AdmitError;

/// Fixed-size permit pool. Created full and never resized.
#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ConcurrencyGate {
    /// Gate with `max_concurrent` permits, capped at [`Semaphore::MAX_PERMITS`].
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.min(Semaphore::MAX_PERMITS);
        Self { semaphore: Arc::new(Semaphore::new(max_concurrent)), max_concurrent }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held by admitted callers.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent.saturating_sub(self.available_permits())
    }

    /// Wait for a permit, giving up when `ctx` fires.
    ///
    /// Waiters are served in no promised order. An abandoned wait holds no permit.
    pub async fn acquire(&self, ctx: &Context) -> Result<Release, AdmitError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            permit = self.semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => Ok(Release { permit: Some(permit) }),
                // The semaphore is owned here and never closed.
                Err(_) => Err(AdmitError::Canceled),
            },
        }
    }
}

/// One-shot handle returned by a successful admission.
///
/// Holds the concurrency permit, if the call took one. The permit is returned to
/// its gate by [`Release::release`] or when the handle is dropped, whichever comes
/// first; since `release` consumes the handle, a permit can never be returned twice.
#[derive(Debug, Default)]
#[must_use = "dropping the release handle immediately frees its permit"]
pub struct Release {
    permit: Option<OwnedSemaphorePermit>,
}

impl Release {
    /// Handle with nothing to release.
    pub fn noop() -> Self {
        Self { permit: None }
    }

    /// Whether this handle holds a concurrency permit.
    pub fn holds_permit(&self) -> bool {
        self.permit.is_some()
    }

    /// Return the permit, if any, to its gate.
    pub fn release(self) {
        drop(self);
    }
}
