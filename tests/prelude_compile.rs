//! Compile-time prelude coverage test.
use std::time::Duration;
use tower::{service_fn, ServiceBuilder, ServiceExt};
use turnstile::prelude::*;

struct Ping;

impl Admissible for Ping {
    fn method(&self) -> &str {
        "POST"
    }
    fn path(&self) -> &str {
        "/tickle"
    }
}

#[tokio::test]
async fn prelude_reexports_core_types() {
    let limiter = RateLimiter::new(
        vec![AdmissionRule::new("POST", "/tickle").min_interval(Duration::from_secs(1))],
        DEFAULT_GLOBAL_MIN_INTERVAL,
    );
    let switch = LimiterSwitch::enabled(limiter);
    let account = SelectedAccount::new();

    let svc = ServiceBuilder::new()
        .layer(AdmissionLayer::new(switch, account))
        .service(service_fn(|_req: Ping| async { Ok::<_, std::io::Error>("pong") }));

    let resp = svc.oneshot(Ping).await.expect("admitted");
    assert_eq!(resp, "pong");
}
