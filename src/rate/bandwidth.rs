//! Bandwidth-shaping stages.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::pipeline::{Exchange, LimitFn, Next, RequestContext, Stage, StageResult};
use crate::rate::{FixedTokenBucket, ThrottledStream};

/// Shapes each exchange independently: a pair of buckets is created per
/// exchange, so one slow client never eats into another's budget.
pub struct MaxBandwidthPerRequest {
    bytes_per_second: LimitFn<i64>,
}

impl MaxBandwidthPerRequest {
    /// Limit both directions of every exchange to `bytes_per_second`.
    /// Non-positive values mean unlimited.
    pub fn new(bytes_per_second: i64) -> Self {
        Self::with_provider(move |_| bytes_per_second)
    }

    /// Compute the limit per exchange from the request context.
    pub fn with_provider(
        provider: impl Fn(&RequestContext) -> i64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            bytes_per_second: Arc::new(provider),
        }
    }
}

impl Stage for MaxBandwidthPerRequest {
    fn call<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let context = exchange.context();

            let request_bucket = {
                let provider = Arc::clone(&self.bytes_per_second);
                let context = context.clone();
                Arc::new(FixedTokenBucket::new(move || provider(&context)))
            };
            let response_bucket = {
                let provider = Arc::clone(&self.bytes_per_second);
                Arc::new(FixedTokenBucket::new(move || provider(&context)))
            };

            let _request_registration = request_bucket.register();
            let _response_registration = response_bucket.register();

            let cancel = exchange.cancellation();
            exchange.wrap_request_body(|inner| {
                Box::new(ThrottledStream::new(inner, request_bucket, cancel.clone()))
            });
            let cancel = exchange.cancellation();
            exchange.wrap_response_body(|inner| {
                Box::new(ThrottledStream::new(inner, response_bucket, cancel))
            });

            tracing::debug!("request and response streams shaped per exchange");
            next.run(exchange).await
        })
    }
}

/// Shapes all exchanges against one shared pair of buckets.
///
/// The stage instance owns the buckets; sharing the stage across a pipeline
/// (or several) shares the budget. Global shaping has no per-exchange
/// context, so the provider is zero-argument.
pub struct MaxBandwidthGlobal {
    request_bucket: Arc<FixedTokenBucket>,
    response_bucket: Arc<FixedTokenBucket>,
}

impl MaxBandwidthGlobal {
    /// Cap the combined transfer rate of all exchanges at `bytes_per_second`
    /// per direction. Non-positive values mean unlimited.
    pub fn new(bytes_per_second: i64) -> Self {
        Self::with_provider(move || bytes_per_second)
    }

    /// Sample the shared budget from a zero-argument provider, allowing live
    /// reconfiguration.
    pub fn with_provider(provider: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        let provider = Arc::new(provider);
        let request_provider = Arc::clone(&provider);
        Self {
            request_bucket: Arc::new(FixedTokenBucket::new(move || request_provider())),
            response_bucket: Arc::new(FixedTokenBucket::new(move || provider())),
        }
    }
}

impl Stage for MaxBandwidthGlobal {
    fn call<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let _request_registration = self.request_bucket.register();
            let _response_registration = self.response_bucket.register();

            let cancel = exchange.cancellation();
            let request_bucket = Arc::clone(&self.request_bucket);
            exchange.wrap_request_body(|inner| {
                Box::new(ThrottledStream::new(inner, request_bucket, cancel.clone()))
            });
            let cancel = exchange.cancellation();
            let response_bucket = Arc::clone(&self.response_bucket);
            exchange.wrap_response_body(|inner| {
                Box::new(ThrottledStream::new(inner, response_bucket, cancel))
            });

            tracing::debug!(
                consumers = self.request_bucket.in_flight(),
                "streams attached to the shared bandwidth budget"
            );
            next.run(exchange).await
        })
    }
}
