//! Interval pacing: at most one admission per `interval`.
//!
//! The gate is a token bucket holding a single token, refilled continuously at
//! `1 / interval`. With a capacity of one the bucket reduces to a single instant,
//! the earliest time the next token exists, so that is all the state kept.
//!
//! Waiters never hold a reservation. A token is taken only by a caller that finds
//! it available, so a wait abandoned on cancellation leaves the gate untouched.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

use crate::context::Context;
use crate::error::AdmitError;

/// Token bucket with burst size 1.
#[derive(Debug)]
pub struct PacingGate {
    interval: Duration,
    // Earliest instant at which the token is available; `None` until first use.
    next_token: Mutex<Option<Instant>>,
}

impl PacingGate {
    /// Gate starting with a full bucket.
    pub fn new(interval: Duration) -> Self {
        Self { interval, next_token: Mutex::new(None) }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a token is available right now.
    pub fn is_ready(&self) -> bool {
        match self.ready_at() {
            Some(at) => at <= Instant::now(),
            None => true,
        }
    }

    /// Earliest instant the token will be available, if it is currently spent.
    pub fn ready_at(&self) -> Option<Instant> {
        *self.next_token.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the token if available, otherwise report when it will be.
    pub fn try_take(&self) -> Result<(), Instant> {
        self.take(None)
    }

    // A waiter woken for the token due at `due` is credited from `due` rather than
    // from its wake-up time, so timer lateness does not stretch the interval.
    fn take(&self, due: Option<Instant>) -> Result<(), Instant> {
        let now = Instant::now();
        let mut next = self.next_token.lock().unwrap_or_else(PoisonError::into_inner);
        match *next {
            Some(at) if at > now => Err(at),
            current => {
                let from = match (current, due) {
                    (Some(at), Some(due)) if at == due => at,
                    _ => now,
                };
                let refill = self.refill_after(from);
                *next = Some(if refill > now { refill } else { self.refill_after(now) });
                Ok(())
            }
        }
    }

    // An interval too large to represent never refills within the process lifetime.
    fn refill_after(&self, from: Instant) -> Instant {
        from.checked_add(self.interval).unwrap_or_else(|| far_future(from))
    }

    /// Wait for and take the token, giving up when `ctx` fires.
    ///
    /// Fails immediately if `ctx` has already fired, or if the token cannot appear
    /// before the context deadline.
    pub async fn wait(&self, ctx: &Context) -> Result<(), AdmitError> {
        let mut due = None;
        loop {
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            let ready_at = match self.take(due) {
                Ok(()) => return Ok(()),
                Err(at) => at,
            };
            if let Some(deadline) = ctx.deadline() {
                if ready_at > deadline {
                    return Err(AdmitError::WouldExceedDeadline {
                        wait: ready_at.saturating_duration_since(Instant::now()),
                    });
                }
            }
            tokio::select! {
                biased;
                err = ctx.done() => return Err(err),
                _ = sleep_until(ready_at) => due = Some(ready_at),
            }
        }
    }
}

fn far_future(from: Instant) -> Instant {
    // Roughly 30 years, the same horizon tokio uses for an unbounded sleep.
    from + Duration::from_secs(86400 * 365 * 30)
}
