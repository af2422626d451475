//! Request body size guard: header check plus a byte-counting stream.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures_util::future::BoxFuture;
use http::{header, HeaderMap, Method, StatusCode};
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::LimitError;
use crate::observability;
use crate::pipeline::{Exchange, LimitFn, Next, RequestContext, Stage, StageResult};

/// Counts bytes actually read off a request body and fails the in-flight
/// read once the cumulative count passes the maximum.
///
/// A maximum of zero means no body is allowed at all: the first byte fails
/// with [`LimitError::ContentLengthRequired`] instead.
pub struct LengthLimitedStream<R> {
    inner: R,
    max: u64,
    total: u64,
}

impl<R> LengthLimitedStream<R> {
    pub fn new(inner: R, max: u64) -> Self {
        Self {
            inner,
            max,
            total: 0,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for LengthLimitedStream<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        this.total += (buf.filled().len() - before) as u64;

        if this.total > 0 && this.max == 0 {
            return Poll::Ready(Err(LimitError::ContentLengthRequired.into()));
        }
        if this.total > this.max {
            return Poll::Ready(Err(LimitError::ContentLengthExceeded { max: this.max }.into()));
        }
        Poll::Ready(Ok(()))
    }
}

/// Enforces a maximum request body size.
///
/// Non-chunked requests are checked against the Content-Length header up
/// front: a missing header on POST/PUT rejects with 411, a declared length
/// past the maximum rejects with 413. Chunked requests skip the header check
/// and are counted as bytes are actually read; an overrun fails the
/// downstream read and is translated to 413 here (411 when no body was
/// permitted at all).
pub struct MaxRequestContentLength {
    max_length: LimitFn<u64>,
}

impl MaxRequestContentLength {
    pub fn new(max_length: u64) -> Self {
        Self::with_provider(move |_| max_length)
    }

    /// Compute the limit per exchange from the request context.
    pub fn with_provider(provider: impl Fn(&RequestContext) -> u64 + Send + Sync + 'static) -> Self {
        Self {
            max_length: Arc::new(provider),
        }
    }
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get(header::TRANSFER_ENCODING)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
}

fn declared_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

impl Stage for MaxRequestContentLength {
    fn call<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let context = exchange.context();
            let method = context.method().clone();
            if method == Method::HEAD {
                tracing::debug!("head request forwarded without content length check");
                return next.run(exchange).await;
            }

            let max_length = (self.max_length)(&context);
            if !is_chunked(context.headers()) {
                match declared_content_length(context.headers()) {
                    None => {
                        if method == Method::POST || method == Method::PUT {
                            tracing::info!(
                                method = %method,
                                "content length required, rejecting exchange"
                            );
                            observability::record_rejection("max_request_content_length", 411);
                            exchange.set_status(StatusCode::LENGTH_REQUIRED);
                            return Ok(());
                        }
                        // No declared body on a method that never requires
                        // one: any body byte is a protocol violation.
                        exchange
                            .wrap_request_body(|inner| Box::new(LengthLimitedStream::new(inner, 0)));
                    }
                    Some(declared) if declared > max_length => {
                        tracing::info!(
                            declared,
                            max_length,
                            "declared content length exceeds maximum, rejecting exchange"
                        );
                        observability::record_rejection("max_request_content_length", 413);
                        exchange.set_status(StatusCode::PAYLOAD_TOO_LARGE);
                        return Ok(());
                    }
                    Some(_) => {
                        exchange.wrap_request_body(|inner| {
                            Box::new(LengthLimitedStream::new(inner, max_length))
                        });
                    }
                }
            } else {
                tracing::debug!("chunked request, content length header not checked");
                exchange
                    .wrap_request_body(|inner| Box::new(LengthLimitedStream::new(inner, max_length)));
            }

            match next.run(&mut *exchange).await {
                Ok(()) => Ok(()),
                Err(err) => match LimitError::from_io(&err) {
                    Some(LimitError::ContentLengthRequired) => {
                        tracing::info!("content length required, exchange canceled and rejected");
                        observability::record_rejection("max_request_content_length", 411);
                        exchange.set_status(StatusCode::LENGTH_REQUIRED);
                        Ok(())
                    }
                    Some(LimitError::ContentLengthExceeded { max }) => {
                        tracing::info!(
                            max_length = max,
                            "content length exceeded, exchange canceled and rejected"
                        );
                        observability::record_rejection("max_request_content_length", 413);
                        exchange.set_status(StatusCode::PAYLOAD_TOO_LARGE);
                        Ok(())
                    }
                    _ => Err(err),
                },
            }
        })
    }
}
