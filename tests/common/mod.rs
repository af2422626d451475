//! Shared utilities for exercising governed exchanges in memory.

#![allow(dead_code)]

use std::sync::Arc;

use futures_util::future::BoxFuture;
use http::{HeaderMap, Method, Uri};
use limitgate::pipeline::{Exchange, Handler, StageResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// An in-memory exchange plus the far ends of its body streams.
pub struct TestExchange {
    pub exchange: Exchange,
    /// Far end of the request body: write here to feed the request.
    pub request_feed: DuplexStream,
    /// Far end of the response body: read here to observe the response.
    pub response_sink: DuplexStream,
}

pub fn exchange(method: Method, uri: &str) -> TestExchange {
    exchange_with_headers(method, uri, HeaderMap::new())
}

pub fn exchange_with_headers(method: Method, uri: &str, headers: HeaderMap) -> TestExchange {
    let (request_feed, request_body) = tokio::io::duplex(64 * 1024);
    let (response_body, response_sink) = tokio::io::duplex(64 * 1024);
    let uri: Uri = uri.parse().expect("test uri");

    TestExchange {
        exchange: Exchange::new(
            method,
            uri,
            headers,
            Box::new(request_body),
            Box::new(response_body),
        ),
        request_feed,
        response_sink,
    }
}

/// Handler that does nothing; the exchange keeps its current status.
pub struct Noop;

impl Handler for Noop {
    fn handle<'a>(&'a self, _exchange: &'a mut Exchange) -> BoxFuture<'a, StageResult> {
        Box::pin(async { Ok(()) })
    }
}

/// Handler that reads the request body to the end and discards it.
pub struct DrainRequest;

impl Handler for DrainRequest {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let mut body = Vec::new();
            exchange.request_body_mut().read_to_end(&mut body).await?;
            Ok(())
        })
    }
}

/// Handler that writes a fixed payload to the response body.
pub struct WriteResponse(pub Vec<u8>);

impl Handler for WriteResponse {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            exchange.response_body_mut().write_all(&self.0).await?;
            exchange.response_body_mut().flush().await?;
            Ok(())
        })
    }
}

/// Handler that parks until a permit arrives on the shared semaphore, keeping
/// its exchange in flight.
pub struct HoldUntilReleased(pub Arc<tokio::sync::Semaphore>);

impl Handler for HoldUntilReleased {
    fn handle<'a>(&'a self, _exchange: &'a mut Exchange) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let _permit = self.0.acquire().await.expect("semaphore closed");
            Ok(())
        })
    }
}
