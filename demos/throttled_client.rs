//! Drives a fake HTTP client through the default Client Portal limits.
use std::time::Duration;

use tower::{service_fn, Service, ServiceBuilder, ServiceExt};
use turnstile::{Admissible, AdmissionLayer, Context, LimiterSwitch, SelectedAccount};

#[derive(Debug)]
struct Request {
    method: &'static str,
    path: &'static str,
    deadline: Duration,
}

impl Admissible for Request {
    fn method(&self) -> &str {
        self.method
    }
    fn path(&self) -> &str {
        self.path
    }
    fn context(&self) -> Context {
        Context::background().with_timeout(self.deadline)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let switch = LimiterSwitch::disabled();
    switch.enable_defaults();
    let account = SelectedAccount::new();
    account.set("U1234567");

    let mut client = ServiceBuilder::new()
        .layer(AdmissionLayer::new(switch.clone(), account.clone()))
        .service(service_fn(|req: Request| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, std::io::Error>(format!("{} {} -> 200", req.method, req.path))
        }));

    let started = tokio::time::Instant::now();
    for path in ["/iserver/account/trades", "/iserver/account/trades"] {
        let req = Request { method: "GET", path, deadline: Duration::from_secs(10) };
        let resp = client.ready().await?.call(req).await?;
        println!("{:>6.2?}  {resp}", started.elapsed());
    }

    // A tight deadline on a paced endpoint is refused instead of waiting.
    let req = Request {
        method: "GET",
        path: "/iserver/account/trades",
        deadline: Duration::from_secs(1),
    };
    match client.ready().await?.call(req).await {
        Ok(resp) => println!("unexpected: {resp}"),
        Err(err) => println!("{:>6.2?}  refused: {err}", started.elapsed()),
    }

    switch.disable();
    let req = Request {
        method: "GET",
        path: "/iserver/account/trades",
        deadline: Duration::from_secs(1),
    };
    let resp = client.ready().await?.call(req).await?;
    println!("{:>6.2?}  {resp} (limits disabled)", started.elapsed());
    Ok(())
}
