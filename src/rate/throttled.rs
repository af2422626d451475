//! Write-side throttling decorator over a byte stream.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::error::LimitError;
use crate::rate::FixedTokenBucket;

/// Decorates a stream so writes draw from a shared [`FixedTokenBucket`].
///
/// Only the write side is shaped; reads pass through unmodified. The same
/// wrapper type is applied to both the request and the response stream of an
/// exchange. A write larger than one second's worth of bandwidth is split
/// into rate-capped chunks: each `poll_write` completion transfers at most
/// the current per-second rate, and the caller's write loop supplies the
/// remainder.
pub struct ThrottledStream<S> {
    inner: S,
    bucket: Arc<FixedTokenBucket>,
    cancel: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    throttle: Option<Pin<Box<Sleep>>>,
    /// Tokens already consumed for a chunk whose inner write is still
    /// pending, so a re-poll does not charge the bucket twice.
    reserved: usize,
}

impl<S> ThrottledStream<S> {
    pub fn new(inner: S, bucket: Arc<FixedTokenBucket>, cancel: CancellationToken) -> Self {
        let cancelled = Box::pin(cancel.clone().cancelled_owned());
        Self {
            inner,
            bucket,
            cancel,
            cancelled,
            throttle: None,
            reserved: 0,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ThrottledStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ThrottledStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;

        if this.cancel.is_cancelled() {
            return Poll::Ready(Err(LimitError::Cancelled.into()));
        }
        if buf.is_empty() {
            return Pin::new(&mut this.inner).poll_write(cx, buf);
        }

        loop {
            // Resample on every decision so a live capacity change takes
            // effect mid-transfer.
            let rate = this.bucket.rate();
            if rate <= 0 {
                return Pin::new(&mut this.inner).poll_write(cx, buf);
            }
            let rate = rate as usize;

            if let Some(throttle) = this.throttle.as_mut() {
                match throttle.as_mut().poll(cx) {
                    Poll::Ready(()) => this.throttle = None,
                    Poll::Pending => {
                        // A cancellation must interrupt the wait, not ride
                        // it out.
                        if this.cancelled.as_mut().poll(cx).is_ready() {
                            return Poll::Ready(Err(LimitError::Cancelled.into()));
                        }
                        return Poll::Pending;
                    }
                }
            }

            if this.reserved == 0 {
                let chunk = buf.len().min(rate);
                match this.bucket.should_throttle(chunk as i64) {
                    None => this.reserved = chunk,
                    Some(wait) if wait.is_zero() => {
                        // Unregistered bucket right before its refill; yield
                        // instead of spinning inside this poll.
                        cx.waker().wake_by_ref();
                        return Poll::Pending;
                    }
                    Some(wait) => {
                        crate::observability::record_throttle("bandwidth");
                        this.throttle = Some(Box::pin(tokio::time::sleep(wait)));
                        continue;
                    }
                }
            }

            let chunk = this.reserved.min(buf.len());
            let written = ready!(Pin::new(&mut this.inner).poll_write(cx, &buf[..chunk]))?;
            this.reserved = 0;
            return Poll::Ready(Ok(written));
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
