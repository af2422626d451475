//! Query-string length guard.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use http::StatusCode;

use crate::observability;
use crate::pipeline::{Exchange, LimitFn, Next, RequestContext, Stage, StageResult};

/// Rejects exchanges whose decoded query string exceeds a maximum, with
/// 414 URI Too Long. Exchanges without a query component pass straight
/// through.
pub struct MaxQueryStringLength {
    max_length: LimitFn<usize>,
}

impl MaxQueryStringLength {
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

impl Stage for MaxQueryStringLength {
    fn call<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let context = exchange.context();
            if let Some(query) = context.uri().query() {
                let max_length = (self.max_length)(&context);
                let length = super::decoded_len(query);
                tracing::debug!(length, max_length, "checking query string length");
                if length > max_length {
                    tracing::info!(
                        length,
                        max_length,
                        "query string exceeds allowed length, rejecting exchange"
                    );
                    observability::record_rejection("max_query_string_length", 414);
                    exchange.set_status(StatusCode::URI_TOO_LONG);
                    return Ok(());
                }
            } else {
                tracing::debug!("no query string");
            }
            next.run(exchange).await
        })
    }
}
