//! Deadline and cancellation carried by a caller into `admit`.
//!
//! A [`Context`] is cheap to clone and is threaded through unchanged from the
//! original caller. Waits inside the limiter race against [`Context::done`].

use std::future::pending;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};

use crate::error::AdmitError;

/// Deadline and cancellation signal for one logical operation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<Arc<CancelState>>,
}

#[derive(Debug, Default)]
struct CancelState {
    canceled: AtomicBool,
    notify: Notify,
}

impl CancelState {
    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel is not missed.
            notified.as_mut().enable();
            if self.canceled.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

/// Handle that cancels every [`Context`] derived from the same `with_cancel` call.
#[derive(Debug, Clone)]
pub struct Canceller {
    state: Arc<CancelState>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.state.canceled.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    pub fn is_canceled(&self) -> bool {
        self.state.canceled.load(Ordering::Acquire)
    }
}

impl Context {
    /// Context that never cancels and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Set an absolute deadline; an earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Deadline `timeout` from now.
    ///
    /// A timeout too large to represent as an instant adds no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Attach a fresh cancellation signal, replacing any previous one.
    pub fn with_cancel(mut self) -> (Self, Canceller) {
        let state = Arc::new(CancelState::default());
        self.cancel = Some(state.clone());
        (self, Canceller { state })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The error this context has already fired with, if any.
    pub fn err(&self) -> Option<AdmitError> {
        if self.cancel.as_ref().is_some_and(|c| c.canceled.load(Ordering::Acquire)) {
            return Some(AdmitError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(AdmitError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is canceled or its deadline passes.
    ///
    /// Never resolves for a background context.
    pub async fn done(&self) -> AdmitError {
        let canceled = async {
            match &self.cancel {
                Some(state) => state.wait().await,
                None => pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = canceled => AdmitError::Canceled,
            _ = expired => AdmitError::DeadlineExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_never_fires() {
        let ctx = Context::background();
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_after_timeout() {
        let ctx = Context::background().with_timeout(Duration::from_secs(2));
        assert!(ctx.err().is_none());
        let start = Instant::now();
        assert_eq!(ctx.done().await, AdmitError::DeadlineExceeded);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(ctx.err(), Some(AdmitError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_deadline_is_kept() {
        let now = Instant::now();
        let ctx = Context::background()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(10));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeout_adds_no_deadline() {
        let ctx = Context::background().with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert!(ctx.err().is_none());

        let deadline = Instant::now() + Duration::from_secs(5);
        let ctx = Context::background().with_deadline(deadline).with_timeout(Duration::MAX);
        assert_eq!(ctx.deadline(), Some(deadline));
    }

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let (ctx, canceller) = Context::background().with_cancel();
        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.done().await }
        });
        tokio::task::yield_now().await;
        canceller.cancel();
        assert_eq!(waiter.await.unwrap(), AdmitError::Canceled);
        assert!(canceller.is_canceled());
        assert_eq!(ctx.err(), Some(AdmitError::Canceled));
    }

    #[tokio::test]
    async fn cancel_before_wait_resolves_immediately() {
        let (ctx, canceller) = Context::background().with_cancel();
        canceller.cancel();
        assert_eq!(ctx.done().await, AdmitError::Canceled);
    }
}
