//! Atomic admission counter and the stage enforcing it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use http::StatusCode;

use crate::observability;
use crate::pipeline::{Exchange, LimitFn, Next, RequestContext, Stage, StageResult};

/// Counts exchanges currently inside the downstream portion of a pipeline.
///
/// Each governed pipeline owns its gate; sharing the stage (and therefore
/// the gate) across pipelines widens the scope deliberately.
#[derive(Debug, Default)]
pub struct ConcurrencyGate {
    in_flight: AtomicU64,
}

impl ConcurrencyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the gate. The permit records the post-increment position and
    /// decrements unconditionally on drop.
    pub fn enter(self: &Arc<Self>) -> GatePermit {
        let position = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        GatePermit {
            gate: Arc::clone(self),
            position,
        }
    }

    /// Exchanges currently holding a permit.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// RAII admission permit.
#[derive(Debug)]
pub struct GatePermit {
    gate: Arc<ConcurrencyGate>,
    position: u64,
}

impl GatePermit {
    /// Post-increment value of the counter at entry time.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        let remaining = self.gate.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::trace!(in_flight = remaining, "exchange left the concurrency gate");
    }
}

/// Rejects exchanges past a concurrency ceiling with 503 Service Unavailable.
pub struct MaxConcurrentRequests {
    gate: Arc<ConcurrencyGate>,
    max_concurrent: LimitFn<i64>,
}

impl MaxConcurrentRequests {
    /// Admit at most `max_concurrent` simultaneous exchanges. Non-positive
    /// values mean unlimited.
    pub fn new(max_concurrent: i64) -> Self {
        Self::with_provider(move |_| max_concurrent)
    }

    /// Compute the ceiling per exchange from the request context.
    pub fn with_provider(
        provider: impl Fn(&RequestContext) -> i64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            gate: Arc::new(ConcurrencyGate::new()),
            max_concurrent: Arc::new(provider),
        }
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }
}

impl Stage for MaxConcurrentRequests {
    fn call<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let ceiling = {
                let raw = (self.max_concurrent)(&exchange.context());
                if raw <= 0 {
                    u64::MAX
                } else {
                    raw as u64
                }
            };

            let permit = self.gate.enter();
            tracing::debug!(
                current = permit.position(),
                ceiling,
                "concurrent exchange entered"
            );
            if permit.position() > ceiling {
                tracing::info!(ceiling, "concurrency ceiling reached, rejecting exchange");
                observability::record_rejection("max_concurrent_requests", 503);
                exchange.set_status(StatusCode::SERVICE_UNAVAILABLE);
                return Ok(());
            }

            // Permit held across downstream; Drop releases it on every path.
            next.run(exchange).await
        })
    }
}
