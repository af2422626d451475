//! Reset-on-activity watchdog and the stream decorator bound to it.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};

use crate::error::LimitError;
use crate::pipeline::{Exchange, LimitFn, Next, RequestContext, Stage, StageResult};

/// Shared idle budget: a deadline that moves forward on every activity and a
/// terminal disposed flag.
///
/// Cloning shares the budget; the stage wraps both sides of an exchange with
/// clones of one watchdog so request reads and response writes keep each
/// other alive.
#[derive(Debug, Clone)]
pub struct IdleWatchdog {
    shared: Arc<WatchdogShared>,
}

#[derive(Debug)]
struct WatchdogShared {
    timeout: Duration,
    origin: Instant,
    /// Last activity, in nanoseconds since `origin`.
    last_activity: AtomicU64,
    disposed: AtomicBool,
}

impl IdleWatchdog {
    /// Seed the budget now; the first deadline is `timeout` from this call.
    pub fn new(timeout: Duration) -> Self {
        Self {
            shared: Arc::new(WatchdogShared {
                timeout,
                origin: Instant::now(),
                last_activity: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.shared.timeout
    }

    /// Record activity: the deadline becomes now + timeout (a reset, not an
    /// extension of whatever remained).
    pub fn touch(&self) {
        let elapsed = self.shared.origin.elapsed().as_nanos() as u64;
        self.shared.last_activity.store(elapsed, Ordering::Release);
    }

    /// Instant at which the budget runs out, absent further activity.
    pub fn deadline(&self) -> Instant {
        let last = self.shared.last_activity.load(Ordering::Acquire);
        self.shared.origin + Duration::from_nanos(last) + self.shared.timeout
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Mark the budget expired. Returns true for the caller that performed
    /// the transition; disposal is idempotent.
    fn dispose(&self) -> bool {
        !self.shared.disposed.swap(true, Ordering::AcqRel)
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.deadline()
    }

    fn disposed_error(&self) -> io::Error {
        LimitError::IdleTimeout {
            timeout: self.shared.timeout,
        }
        .into()
    }
}

/// Decorates a byte stream so it dies when the shared watchdog runs out.
///
/// Every successful read or write of at least one byte resets the budget.
/// While an operation is pending, a timer armed at the shared deadline wakes
/// the task; if the deadline truly passed (the other side may have moved it)
/// the stream is disposed and the pending operation fails with a
/// [`LimitError::IdleTimeout`] payload. Operations after disposal fail the
/// same way.
pub struct TimeoutStream<S> {
    inner: S,
    watchdog: IdleWatchdog,
    deadline: Pin<Box<Sleep>>,
}

impl<S> TimeoutStream<S> {
    pub fn new(inner: S, watchdog: IdleWatchdog) -> Self {
        let deadline = Box::pin(tokio::time::sleep_until(watchdog.deadline()));
        Self {
            inner,
            watchdog,
            deadline,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Fail fast when the budget already ran out, before touching the inner
    /// stream.
    fn guard(&mut self) -> io::Result<()> {
        if self.watchdog.is_disposed() {
            return Err(self.watchdog.disposed_error());
        }
        if self.watchdog.expired() {
            if self.watchdog.dispose() {
                tracing::info!(
                    timeout = ?self.watchdog.timeout(),
                    "idle timeout reached, disposing stream"
                );
            }
            return Err(self.watchdog.disposed_error());
        }
        Ok(())
    }

    /// Arm the timer at the current shared deadline and poll it. Ready means
    /// the budget ran out while the operation was pending.
    fn poll_idle(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        loop {
            let target = self.watchdog.deadline();
            if self.deadline.deadline() != target {
                self.deadline.as_mut().reset(target);
            }
            match self.deadline.as_mut().poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(()) => {
                    // Activity on the other side may have moved the deadline
                    // since this timer was armed.
                    if self.watchdog.deadline() <= Instant::now() {
                        if self.watchdog.dispose() {
                            tracing::info!(
                                timeout = ?self.watchdog.timeout(),
                                "idle timeout reached, disposing stream"
                            );
                        }
                        return Poll::Ready(self.watchdog.disposed_error());
                    }
                }
            }
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TimeoutStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if let Err(err) = this.guard() {
            return Poll::Ready(Err(err));
        }

        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                if buf.filled().len() > before {
                    this.watchdog.touch();
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
            Poll::Pending => match this.poll_idle(cx) {
                Poll::Ready(err) => Poll::Ready(Err(err)),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TimeoutStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        if let Err(err) = this.guard() {
            return Poll::Ready(Err(err));
        }

        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(written)) => {
                if written > 0 {
                    this.watchdog.touch();
                }
                Poll::Ready(Ok(written))
            }
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
            Poll::Pending => match this.poll_idle(cx) {
                Poll::Ready(err) => Poll::Ready(Err(err)),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Disposes idle exchanges: no read on the request side and no write on the
/// response side within the timeout closes both streams.
pub struct ConnectionTimeout {
    timeout: LimitFn<Duration>,
}

impl ConnectionTimeout {
    pub fn new(timeout: Duration) -> Self {
        Self::with_provider(move |_| timeout)
    }

    /// Compute the timeout per exchange from the request context.
    pub fn with_provider(
        provider: impl Fn(&RequestContext) -> Duration + Send + Sync + 'static,
    ) -> Self {
        Self {
            timeout: Arc::new(provider),
        }
    }
}

impl Stage for ConnectionTimeout {
    fn call<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let timeout = (self.timeout)(&exchange.context());
            let watchdog = IdleWatchdog::new(timeout);

            let request_watchdog = watchdog.clone();
            exchange
                .wrap_request_body(|inner| Box::new(TimeoutStream::new(inner, request_watchdog)));
            let response_watchdog = watchdog.clone();
            exchange
                .wrap_response_body(|inner| Box::new(TimeoutStream::new(inner, response_watchdog)));

            tracing::debug!(?timeout, "idle watchdog armed on both stream sides");
            next.run(exchange).await
        })
    }
}
