//! Admission-control scenarios.

use std::sync::Arc;

use http::{Method, StatusCode};
use limitgate::admission::MaxConcurrentRequests;
use limitgate::pipeline::Pipeline;
use tokio::sync::Semaphore;

mod common;

#[tokio::test]
async fn exchange_past_the_ceiling_is_rejected_with_503() {
    let stage = MaxConcurrentRequests::new(1);
    let gate = Arc::clone(stage.gate());
    let pipeline = Arc::new(Pipeline::new().stage(stage));

    let release = Arc::new(Semaphore::new(0));
    let holder = {
        let pipeline = Arc::clone(&pipeline);
        let release = Arc::clone(&release);
        tokio::spawn(async move {
            let mut held = common::exchange(Method::GET, "http://example.com/slow");
            pipeline
                .run(&mut held.exchange, &common::HoldUntilReleased(release))
                .await
                .unwrap();
            held.exchange.status()
        })
    };

    // Wait until the first exchange is inside the gate.
    while gate.in_flight() == 0 {
        tokio::task::yield_now().await;
    }

    let mut rejected = common::exchange(Method::GET, "http://example.com/fast");
    pipeline
        .run(&mut rejected.exchange, &common::Noop)
        .await
        .unwrap();
    assert_eq!(
        rejected.exchange.status(),
        StatusCode::SERVICE_UNAVAILABLE,
        "second simultaneous exchange should be rejected at ceiling 1"
    );

    release.add_permits(1);
    assert_eq!(holder.await.unwrap(), StatusCode::OK);

    // The in-flight exchange completed; the next attempt is admitted.
    let mut admitted = common::exchange(Method::GET, "http://example.com/next");
    pipeline
        .run(&mut admitted.exchange, &common::Noop)
        .await
        .unwrap();
    assert_eq!(admitted.exchange.status(), StatusCode::OK);

    // Rejected and admitted exchanges alike released their permits.
    assert_eq!(gate.in_flight(), 0);
}

#[tokio::test]
async fn non_positive_ceiling_admits_everything() {
    let stage = MaxConcurrentRequests::new(0);
    let gate = Arc::clone(stage.gate());
    let pipeline = Arc::new(Pipeline::new().stage(stage));

    let release = Arc::new(Semaphore::new(0));
    let mut holders = Vec::new();
    for i in 0..3 {
        let pipeline = Arc::clone(&pipeline);
        let release = Arc::clone(&release);
        holders.push(tokio::spawn(async move {
            let mut held = common::exchange(Method::GET, &format!("http://example.com/{i}"));
            pipeline
                .run(&mut held.exchange, &common::HoldUntilReleased(release))
                .await
                .unwrap();
            held.exchange.status()
        }));
    }

    while gate.in_flight() < 3 {
        tokio::task::yield_now().await;
    }

    release.add_permits(3);
    for holder in holders {
        assert_eq!(holder.await.unwrap(), StatusCode::OK);
    }
    assert_eq!(gate.in_flight(), 0);
}

#[tokio::test]
async fn ceiling_can_vary_per_exchange() {
    // One shared gate, but /scarce tolerates a single exchange while every
    // other path tolerates plenty.
    let stage = MaxConcurrentRequests::with_provider(|context| {
        if context.uri().path() == "/scarce" {
            1
        } else {
            100
        }
    });
    let gate = Arc::clone(stage.gate());
    let pipeline = Arc::new(Pipeline::new().stage(stage));

    let release = Arc::new(Semaphore::new(0));
    let holder = {
        let pipeline = Arc::clone(&pipeline);
        let release = Arc::clone(&release);
        tokio::spawn(async move {
            let mut held = common::exchange(Method::GET, "http://example.com/scarce");
            pipeline
                .run(&mut held.exchange, &common::HoldUntilReleased(release))
                .await
                .unwrap();
            held.exchange.status()
        })
    };

    while gate.in_flight() == 0 {
        tokio::task::yield_now().await;
    }

    let mut scarce = common::exchange(Method::GET, "http://example.com/scarce");
    pipeline
        .run(&mut scarce.exchange, &common::Noop)
        .await
        .unwrap();
    assert_eq!(scarce.exchange.status(), StatusCode::SERVICE_UNAVAILABLE);

    let mut roomy = common::exchange(Method::GET, "http://example.com/roomy");
    pipeline
        .run(&mut roomy.exchange, &common::Noop)
        .await
        .unwrap();
    assert_eq!(roomy.exchange.status(), StatusCode::OK);

    release.add_permits(1);
    assert_eq!(holder.await.unwrap(), StatusCode::OK);
}
