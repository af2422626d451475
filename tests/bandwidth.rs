//! Bandwidth-shaping scenarios.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use limitgate::pipeline::Pipeline;
use limitgate::rate::{MaxBandwidthGlobal, MaxBandwidthPerRequest};
use tokio::io::AsyncReadExt;
use tokio::time::Instant;

mod common;

#[tokio::test(start_paused = true)]
async fn response_writes_are_capped_at_the_per_request_rate() {
    let pipeline = Pipeline::new().stage(MaxBandwidthPerRequest::new(100));
    let mut t = common::exchange(Method::GET, "http://example.com/download");

    let start = Instant::now();
    pipeline
        .run(&mut t.exchange, &common::WriteResponse(vec![7u8; 250]))
        .await
        .unwrap();

    // 100 bytes immediately, then one refill wait per remaining chunk.
    assert!(start.elapsed() >= Duration::from_secs(2));

    let mut received = vec![0u8; 250];
    t.response_sink.read_exact(&mut received).await.unwrap();
    assert!(received.iter().all(|&b| b == 7));
}

#[tokio::test(start_paused = true)]
async fn global_budget_is_shared_across_exchanges() {
    let pipeline = Pipeline::new().stage(MaxBandwidthGlobal::new(100));

    // The first exchange drains the shared bucket for this second.
    let mut first = common::exchange(Method::GET, "http://example.com/a");
    pipeline
        .run(&mut first.exchange, &common::WriteResponse(vec![0u8; 100]))
        .await
        .unwrap();

    // The second pays for it with a refill wait.
    let start = Instant::now();
    let mut second = common::exchange(Method::GET, "http://example.com/b");
    pipeline
        .run(&mut second.exchange, &common::WriteResponse(vec![0u8; 100]))
        .await
        .unwrap();
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn capacity_change_applies_mid_transfer() {
    let capacity = Arc::new(AtomicI64::new(100));
    let shared = Arc::clone(&capacity);
    let pipeline = Pipeline::new().stage(MaxBandwidthPerRequest::with_provider(move |_| {
        shared.load(Ordering::Relaxed)
    }));

    let bump = Arc::clone(&capacity);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        bump.store(300, Ordering::Relaxed);
    });

    let mut t = common::exchange(Method::GET, "http://example.com/download");
    let start = Instant::now();
    pipeline
        .run(&mut t.exchange, &common::WriteResponse(vec![0u8; 300]))
        .await
        .unwrap();

    // 100 bytes on the old budget, then the remaining 200 fit into the first
    // refill at the raised rate; the old rate would have needed two.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn unlimited_rate_adds_no_wait() {
    let pipeline = Pipeline::new().stage(MaxBandwidthPerRequest::new(0));
    let mut t = common::exchange(Method::GET, "http://example.com/download");

    let start = Instant::now();
    pipeline
        .run(&mut t.exchange, &common::WriteResponse(vec![0u8; 4096]))
        .await
        .unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
}
