//! Live enable/disable of a client's limiter.
//!
//! A [`LimiterSwitch`] is the single place a client checks whether rate limiting is
//! on. Reads are lock-free through `ArcSwapOption`; installing or removing a limiter
//! swaps the whole engine, so gate state lives exactly as long as the limiter that
//! owns it.

use std::sync::{Arc, PoisonError, RwLock};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tracing::info;

use crate::concurrency::Release;
use crate::context::Context;
use crate::error::AdmitError;
use crate::limiter::RateLimiter;

/// Anything that can admit an outbound call.
#[async_trait]
pub trait Admission: Send + Sync {
    /// Wait until `(method, path)` for `account` may be sent.
    async fn admit(
        &self,
        ctx: &Context,
        method: &str,
        path: &str,
        account: Option<&str>,
    ) -> Result<Release, AdmitError>;
}

#[async_trait]
impl Admission for RateLimiter {
    async fn admit(
        &self,
        ctx: &Context,
        method: &str,
        path: &str,
        account: Option<&str>,
    ) -> Result<Release, AdmitError> {
        RateLimiter::admit(self, ctx, method, path, account).await
    }
}

#[async_trait]
impl<T: Admission + ?Sized> Admission for Arc<T> {
    async fn admit(
        &self,
        ctx: &Context,
        method: &str,
        path: &str,
        account: Option<&str>,
    ) -> Result<Release, AdmitError> {
        (**self).admit(ctx, method, path, account).await
    }
}

/// Optional limiter slot, off by default.
#[derive(Debug, Default, Clone)]
pub struct LimiterSwitch {
    inner: Arc<ArcSwapOption<RateLimiter>>,
}

impl LimiterSwitch {
    /// Switch with no limiter installed.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Switch with `limiter` installed.
    pub fn enabled(limiter: RateLimiter) -> Self {
        let switch = Self::default();
        switch.set(Some(limiter));
        switch
    }

    /// Install the documented service quotas, replacing any current limiter.
    pub fn enable_defaults(&self) {
        self.set(Some(RateLimiter::with_defaults()));
    }

    /// Install `limiter`, or remove the current one with `None`.
    ///
    /// Calls already holding a [`Release`] keep their permits on the old gates.
    pub fn set(&self, limiter: Option<RateLimiter>) {
        match &limiter {
            Some(l) => info!(
                target: "turnstile::switch",
                rules = l.rules().len(),
                global_interval = ?l.global_interval(),
                "rate limiting enabled"
            ),
            None => info!(target: "turnstile::switch", "rate limiting disabled"),
        }
        self.inner.store(limiter.map(Arc::new));
    }

    pub fn disable(&self) {
        self.set(None);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.load().is_some()
    }

    /// Snapshot of the installed limiter.
    pub fn current(&self) -> Option<Arc<RateLimiter>> {
        self.inner.load_full()
    }

    /// Admit through the installed limiter; unconditionally admitted when disabled.
    pub async fn admit(
        &self,
        ctx: &Context,
        method: &str,
        path: &str,
        account: Option<&str>,
    ) -> Result<Release, AdmitError> {
        match self.current() {
            Some(limiter) => RateLimiter::admit(&limiter, ctx, method, path, account).await,
            None => Ok(Release::noop()),
        }
    }
}

#[async_trait]
impl Admission for LimiterSwitch {
    async fn admit(
        &self,
        ctx: &Context,
        method: &str,
        path: &str,
        account: Option<&str>,
    ) -> Result<Release, AdmitError> {
        LimiterSwitch::admit(self, ctx, method, path, account).await
    }
}

/// Account currently selected on the client, shared with the admission path.
#[derive(Debug, Default, Clone)]
pub struct SelectedAccount {
    inner: Arc<RwLock<Option<String>>>,
}

impl SelectedAccount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Record the selected account. Empty ids are ignored.
    pub fn set(&self, account: impl Into<String>) {
        let account = account.into();
        if account.is_empty() {
            return;
        }
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(account);
    }
}
