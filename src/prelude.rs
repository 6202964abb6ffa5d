//! Convenient re-exports for common Turnstile types.
pub use crate::{
    concurrency::Release,
    context::{Canceller, Context},
    error::{AdmitError, ThrottleError},
    limiter::RateLimiter,
    middleware::{Admissible, AdmissionLayer},
    rule::{default_rules, AdmissionRule, RuleKey, DEFAULT_GLOBAL_MIN_INTERVAL},
    switch::{Admission, LimiterSwitch, SelectedAccount},
};
