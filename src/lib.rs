#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Turnstile
//!
//! Admission control for API clients that talk to a service with documented global
//! and per-endpoint quotas. Every outbound call asks the limiter for admission first
//! and either proceeds immediately, waits for a pacing token, or waits for a
//! concurrency slot.
//!
//! ## Features
//!
//! - **Global pacing** shared by every call of a client
//! - **Per-endpoint rules** matched by HTTP method and longest path prefix
//! - **Interval pacing** (token bucket, burst 1) and **concurrency caps** per rule
//! - **Per-account partitioning** so accounts do not throttle each other
//! - **Deadlines and cancellation** on every wait, without leaking tokens or permits
//! - **Optional by construction**: a disabled [`LimiterSwitch`] admits everything
//! - **Tower middleware** for wiring the limiter in front of an HTTP client
//!
//! ## Quick Start
//!
//! ```rust
//! use turnstile::{Context, LimiterSwitch};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), turnstile::AdmitError> {
//!     let switch = LimiterSwitch::disabled();
//!     switch.enable_defaults();
//!
//!     let release = switch
//!         .admit(&Context::background(), "GET", "/iserver/account/trades", Some("U1234567"))
//!         .await?;
//!     // Send the request, then hand the slot back.
//!     release.release();
//!     Ok(())
//! }
//! ```

pub mod concurrency;
#[cfg(feature = "config")]
pub mod config;
pub mod context;
pub mod error;
pub mod limiter;
pub mod middleware;
pub mod pacing;
pub mod prelude;
pub mod registry;
pub mod rule;
pub mod switch;

// Re-exports
pub use concurrency::{ConcurrencyGate, Release};
#[cfg(feature = "config")]
pub use config::{ConfigError, LimiterConfig, RuleConfig};
pub use context::{Canceller, Context};
pub use error::{AdmitError, ThrottleError};
pub use limiter::RateLimiter;
pub use middleware::{Admissible, AdmissionLayer, AdmissionService};
pub use pacing::PacingGate;
pub use registry::{GateKind, GateRegistry};
pub use rule::{default_rules, AdmissionRule, RuleKey, RuleTable, DEFAULT_GLOBAL_MIN_INTERVAL};
pub use switch::{Admission, LimiterSwitch, SelectedAccount};
