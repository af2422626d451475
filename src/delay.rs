//! Minimum response delay.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::error::LimitError;
use crate::pipeline::{Exchange, LimitFn, Next, RequestContext, Stage, StageResult};

/// Holds every exchange for a fixed duration before the downstream stages
/// run. A zero delay passes straight through; cancellation wakes the sleep
/// immediately and fails the exchange instead of waiting out the delay.
pub struct MinResponseDelay {
    delay: LimitFn<Duration>,
}

impl MinResponseDelay {
    pub fn new(delay: Duration) -> Self {
        Self::with_provider(move |_| delay)
    }

    /// Compute the delay per exchange from the request context.
    pub fn with_provider(
        provider: impl Fn(&RequestContext) -> Duration + Send + Sync + 'static,
    ) -> Self {
        Self {
            delay: Arc::new(provider),
        }
    }
}

impl Stage for MinResponseDelay {
    fn call<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let delay = (self.delay)(&exchange.context());
            if delay.is_zero() {
                return next.run(exchange).await;
            }

            tracing::debug!(?delay, "delaying response");
            let cancel = exchange.cancellation();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(LimitError::Cancelled.into()),
            }
            next.run(exchange).await
        })
    }
}
