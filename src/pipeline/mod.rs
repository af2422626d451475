//! The exchange/stage contract consumed from the hosting pipeline.
//!
//! # Data Flow
//! ```text
//! Incoming exchange:
//!     → Pipeline::run (ordered stage chain)
//!         → stage 1 (reject, wrap body streams, or delay)
//!         → stage 2 ...
//!         → terminal Handler (reads request body, writes response body)
//! ```
//!
//! # Design Decisions
//! - Stages receive the exchange and a [`Next`] continuation; a stage that
//!   rejects sets a status and returns without invoking `Next`
//! - Body streams are swappable slots so stage decorators nest freely
//! - The request head is shared and read-only; limit providers compute
//!   per-exchange values from it, nothing in this layer mutates it
//! - Cancellation rides a `CancellationToken` tied to the exchange lifetime

mod context;
mod exchange;

pub use context::RequestContext;
pub use exchange::{BodyReader, BodyWriter, Exchange, RequestHead};

use std::io;
use std::sync::Arc;

use futures_util::future::BoxFuture;

/// Context-to-value function computing a limit for one exchange.
///
/// Every limit type is configured through this single contract; the
/// constant-valued constructors are convenience adapters over it.
pub type LimitFn<T> = Arc<dyn Fn(&RequestContext) -> T + Send + Sync>;

/// Result of running a stage, handler, or whole pipeline.
///
/// Rejections are not errors: a rejecting stage records its verdict on the
/// exchange status and returns `Ok`. Errors are transport-level failures
/// (possibly carrying a [`crate::LimitError`] payload) escaping the exchange.
pub type StageResult = io::Result<()>;

/// One unit of governance logic inserted into the pipeline.
pub trait Stage: Send + Sync {
    fn call<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, StageResult>;
}

/// Terminal exchange processor invoked after every stage admitted the
/// exchange.
///
/// Implemented for plain `fn` items and any closure matching the shape; use
/// a struct implementation when the handler needs captured state.
pub trait Handler: Send + Sync {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, StageResult>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a, StageResult> + Send + Sync,
{
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, StageResult> {
        (self)(exchange)
    }
}

/// Continuation to the remaining stages and the terminal handler.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    /// Invoke the rest of the pipeline on the exchange.
    pub async fn run(self, exchange: &mut Exchange) -> StageResult {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    handler: self.handler,
                };
                stage.call(exchange, next).await
            }
            None => self.handler.handle(exchange).await,
        }
    }
}

/// Ordered chain of governance stages terminating in a handler.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage to the chain.
    pub fn stage<S: Stage + 'static>(self, stage: S) -> Self {
        self.stage_shared(Arc::new(stage))
    }

    /// Append an already-shared stage, e.g. one whose internal counters are
    /// deliberately shared with another pipeline.
    pub fn stage_shared(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run the exchange through every stage and, if admitted, the handler.
    pub async fn run(&self, exchange: &mut Exchange, handler: &dyn Handler) -> StageResult {
        Next {
            stages: &self.stages,
            handler,
        }
        .run(exchange)
        .await
    }
}
