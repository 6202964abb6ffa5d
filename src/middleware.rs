use crate::concurrency::Release;
use crate::context::Context;
use crate::error::ThrottleError;
use crate::switch::{Admission, SelectedAccount};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Requests that can be identified for admission.
pub trait Admissible {
    /// HTTP method of the outbound call.
    fn method(&self) -> &str;
    /// Request path; a query string, if present, is ignored for matching.
    fn path(&self) -> &str;
    /// Deadline and cancellation for this call.
    fn context(&self) -> Context {
        Context::background()
    }
}

/// A layer that admits each request through an [`Admission`] before calling the inner service.
#[derive(Debug)]
pub struct AdmissionLayer<A> {
    admission: Arc<A>,
    account: SelectedAccount,
}

impl<A> Clone for AdmissionLayer<A> {
    fn clone(&self) -> Self {
        Self { admission: self.admission.clone(), account: self.account.clone() }
    }
}

impl<A> AdmissionLayer<A> {
    /// Create a layer that reads the current account from `account` on every call.
    pub fn new(admission: A, account: SelectedAccount) -> Self {
        Self { admission: Arc::new(admission), account }
    }
}

impl<S, A> Layer<S> for AdmissionLayer<A>
where
    A: Admission + 'static,
{
    type Service = AdmissionService<S, A>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionService {
            inner: service,
            admission: self.admission.clone(),
            account: self.account.clone(),
        }
    }
}

/// Middleware service that holds an admission for the lifetime of each call.
#[derive(Debug)]
pub struct AdmissionService<S, A> {
    inner: S,
    admission: Arc<A>,
    account: SelectedAccount,
}

impl<S: Clone, A> Clone for AdmissionService<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            admission: self.admission.clone(),
            account: self.account.clone(),
        }
    }
}

impl<S, A, Req> Service<Req> for AdmissionService<S, A>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    A: Admission + 'static,
    Req: Admissible + Send + 'static,
{
    type Response = S::Response;
    type Error = ThrottleError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(ThrottleError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let admission = self.admission.clone();
        let account = self.account.get();
        // Take the service that was driven to readiness; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let ctx = req.context();
            let method = req.method().to_owned();
            let path = req.path().to_owned();
            let release: Release = admission
                .admit(&ctx, &method, &path, account.as_deref())
                .await
                .map_err(ThrottleError::Admission)?;
            let result = inner.call(req).await.map_err(ThrottleError::Inner);
            release.release();
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::RateLimiter;
    use crate::rule::AdmissionRule;
    use crate::switch::LimiterSwitch;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::{service_fn, ServiceExt};

    struct Call {
        method: &'static str,
        path: &'static str,
        ctx: Context,
    }

    impl Admissible for Call {
        fn method(&self) -> &str {
            self.method
        }
        fn path(&self) -> &str {
            self.path
        }
        fn context(&self) -> Context {
            self.ctx.clone()
        }
    }

    fn get(path: &'static str) -> Call {
        Call { method: "GET", path, ctx: Context::background() }
    }

    #[tokio::test]
    async fn admitted_request_reaches_inner_service() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = AdmissionLayer::new(LimiterSwitch::disabled(), SelectedAccount::new()).layer(
            service_fn({
                let calls = calls.clone();
                move |req: Call| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, std::io::Error>(req.path)
                    }
                }
            }),
        );

        let resp = svc.oneshot(get("/tickle")).await.unwrap();
        assert_eq!(resp, "/tickle");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refused_request_never_reaches_inner_service() {
        let calls = Arc::new(AtomicUsize::new(0));
        let limiter = RateLimiter::new(
            vec![AdmissionRule::new("GET", "/slow").min_interval(Duration::from_secs(60))],
            Duration::ZERO,
        );
        let layer = AdmissionLayer::new(limiter, SelectedAccount::new());
        let svc = layer.layer(service_fn({
            let calls = calls.clone();
            move |_req: Call| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::io::Error>(())
                }
            }
        }));

        svc.clone().oneshot(get("/slow")).await.unwrap();

        let (ctx, canceller) = Context::background().with_cancel();
        canceller.cancel();
        let err = svc.oneshot(Call { method: "GET", path: "/slow", ctx }).await.unwrap_err();
        assert!(err.is_admission());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permit_is_held_until_inner_call_finishes() {
        let limiter = Arc::new(RateLimiter::new(
            vec![AdmissionRule::new("GET", "/h").max_concurrent(1)],
            Duration::ZERO,
        ));
        let key = limiter.rules().rules()[0].key_for(None);
        let observed = Arc::new(AtomicUsize::new(usize::MAX));

        let svc = AdmissionLayer::new(limiter.clone(), SelectedAccount::new())
            .layer(service_fn({
                let limiter = limiter.clone();
                let observed = observed.clone();
                let key = key.clone();
                move |_req: Call| {
                    let in_flight =
                        limiter.concurrency_gate(&key).map(|g| g.in_flight()).unwrap_or(0);
                    observed.store(in_flight, Ordering::SeqCst);
                    async move { Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "x")) }
                }
            }));

        let err = svc.oneshot(get("/h")).await.unwrap_err();
        assert!(!err.is_admission());
        assert_eq!(observed.load(Ordering::SeqCst), 1, "permit held during the call");
        assert_eq!(limiter.concurrency_gate(&key).unwrap().in_flight(), 0, "released on error");
    }

    #[tokio::test]
    async fn selected_account_partitions_per_account_rules() {
        let limiter = Arc::new(RateLimiter::new(
            vec![AdmissionRule::new("GET", "/trades").max_concurrent(1).per_account()],
            Duration::ZERO,
        ));
        let account = SelectedAccount::new();
        account.set("U1");
        let svc = AdmissionLayer::new(limiter.clone(), account.clone())
            .layer(service_fn(|_req: Call| async { Ok::<_, std::io::Error>(()) }));

        svc.clone().oneshot(get("/trades")).await.unwrap();
        account.set("U2");
        svc.oneshot(get("/trades")).await.unwrap();

        let rule = &limiter.rules().rules()[0];
        assert!(limiter.concurrency_gate(&rule.key_for(Some("U1"))).is_some());
        assert!(limiter.concurrency_gate(&rule.key_for(Some("U2"))).is_some());
        assert_eq!(limiter.registry().len(), 2);
    }
}
