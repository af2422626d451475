//! Absolute URL length guard.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use http::StatusCode;

use crate::observability;
use crate::pipeline::{Exchange, LimitFn, Next, RequestContext, Stage, StageResult};

/// Rejects exchanges whose decoded absolute URL exceeds a maximum, with
/// 414 URI Too Long.
pub struct MaxUrlLength {
    max_length: LimitFn<usize>,
}

impl MaxUrlLength {
    pub fn new(max_length: usize) -> Self {
        Self::with_provider(move |_| max_length)
    }

    /// Compute the limit per exchange from the request context.
    pub fn with_provider(
        provider: impl Fn(&RequestContext) -> usize + Send + Sync + 'static,
    ) -> Self {
        Self {
            max_length: Arc::new(provider),
        }
    }
}

impl Stage for MaxUrlLength {
    fn call<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let context = exchange.context();
            let max_length = (self.max_length)(&context);
            let length = super::decoded_len(&context.uri().to_string());

            tracing::debug!(length, max_length, "checking request url length");
            if length > max_length {
                tracing::info!(
                    url = %context.uri(),
                    length,
                    max_length,
                    "url exceeds allowed length, rejecting exchange"
                );
                observability::record_rejection("max_url_length", 414);
                exchange.set_status(StatusCode::URI_TOO_LONG);
                return Ok(());
            }
            next.run(exchange).await
        })
    }
}
