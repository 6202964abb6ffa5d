//! The admission engine.
//!
//! Every outbound call passes through [`RateLimiter::admit`] before it is sent:
//!
//! 1. the global pacing gate, if one is configured;
//! 2. rule lookup (longest matching prefix);
//! 3. the rule's pacing gate, if it has a minimum interval;
//! 4. the rule's concurrency gate, if it has a concurrency cap.
//!
//! A failure at any step stops there. Nothing later is acquired, and nothing
//! already waited on is handed back, because a pacing wait that fails never took
//! its token in the first place.
//!
//! ```rust
//! use std::time::Duration;
//! use turnstile::{AdmissionRule, Context, RateLimiter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), turnstile::AdmitError> {
//!     let limiter = RateLimiter::new(
//!         vec![AdmissionRule::new("GET", "/iserver/marketdata/history").max_concurrent(5)],
//!         Duration::from_millis(100),
//!     );
//!     let release = limiter
//!         .admit(&Context::background(), "GET", "/iserver/marketdata/history?conid=1", None)
//!         .await?;
//!     // ... send the request ...
//!     release.release();
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::concurrency::{ConcurrencyGate, Release};
use crate::context::Context;
use crate::error::AdmitError;
use crate::pacing::PacingGate;
use crate::registry::GateRegistry;
use crate::rule::{
    default_rules, strip_query, AdmissionRule, RuleKey, RuleTable, DEFAULT_GLOBAL_MIN_INTERVAL,
};

/// Global and per-endpoint admission control for one client.
#[derive(Debug)]
pub struct RateLimiter {
    rules: RuleTable,
    global: Option<PacingGate>,
    registry: GateRegistry,
}

impl RateLimiter {
    /// Limiter over `rules` with global pacing at `global_min_interval`.
    ///
    /// A zero interval disables global pacing.
    pub fn new(
        rules: impl IntoIterator<Item = AdmissionRule>,
        global_min_interval: Duration,
    ) -> Self {
        Self::from_table(RuleTable::new(rules), global_min_interval)
    }

    pub fn from_table(rules: RuleTable, global_min_interval: Duration) -> Self {
        let global =
            (global_min_interval > Duration::ZERO).then(|| PacingGate::new(global_min_interval));
        Self { rules, global, registry: GateRegistry::new() }
    }

    /// Limiter with the documented service quotas.
    pub fn with_defaults() -> Self {
        Self::new(default_rules(), DEFAULT_GLOBAL_MIN_INTERVAL)
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Global pacing interval, `None` when global pacing is off.
    pub fn global_interval(&self) -> Option<Duration> {
        self.global.as_ref().map(PacingGate::interval)
    }

    pub fn registry(&self) -> &GateRegistry {
        &self.registry
    }

    /// Pacing gate already created for `key`.
    pub fn pacing_gate(&self, key: &RuleKey) -> Option<Arc<PacingGate>> {
        self.registry.get_pacing(key)
    }

    /// Concurrency gate already created for `key`.
    pub fn concurrency_gate(&self, key: &RuleKey) -> Option<Arc<ConcurrencyGate>> {
        self.registry.get_concurrency(key)
    }

    /// Wait until the call `(method, path)` for `account` may be sent.
    ///
    /// The returned [`Release`] must be kept until the call finishes and then
    /// released or dropped. It holds a permit only when the matched rule caps
    /// concurrency. On error the call must not be sent.
    pub async fn admit(
        &self,
        ctx: &Context,
        method: &str,
        path: &str,
        account: Option<&str>,
    ) -> Result<Release, AdmitError> {
        if path.is_empty() {
            return Err(AdmitError::EmptyPath);
        }
        let path = strip_query(path);

        if let Some(global) = &self.global {
            global.wait(ctx).await.map_err(|err| {
                debug!(
                    target: "turnstile::limiter",
                    method,
                    path,
                    %err,
                    "global pacing refused admission"
                );
                err
            })?;
        }

        let Some(rule) = self.rules.matching(method, path) else {
            trace!(target: "turnstile::limiter", method, path, "admitted; no rule matched");
            return Ok(Release::noop());
        };
        let key = rule.key_for(account);

        if rule.is_paced() {
            let gate = self.registry.pacing(&key, rule.min_interval);
            gate.wait(ctx).await.map_err(|err| {
                debug!(target: "turnstile::limiter", key = %key, %err, "pacing refused admission");
                err
            })?;
        }

        if !rule.is_bounded() {
            trace!(target: "turnstile::limiter", key = %key, "admitted");
            return Ok(Release::noop());
        }

        let gate = self.registry.concurrency(&key, rule.max_concurrent);
        let release = gate.acquire(ctx).await.map_err(|err| {
            debug!(target: "turnstile::limiter", key = %key, %err, "concurrency refused admission");
            err
        })?;
        trace!(
            target: "turnstile::limiter",
            key = %key,
            in_flight = gate.in_flight(),
            "admitted with permit"
        );
        Ok(release)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::with_defaults()
    }
}
