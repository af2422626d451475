//! Fixed-capacity token bucket with a one-second refill interval.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

const REFILL_INTERVAL: Duration = Duration::from_secs(1);
const REFILL_INTERVAL_NANOS: u64 = REFILL_INTERVAL.as_nanos() as u64;

/// One independent rate budget.
///
/// Capacity is sampled from the provider at every refill, so the budget can
/// be reconfigured while streams are drawing from it. All state is atomic;
/// the refill is guarded by a compare-and-swap flag so racing consumers
/// collapse to a single effective refill without blocking the consume path.
pub struct FixedTokenBucket {
    capacity: Box<dyn Fn() -> i64 + Send + Sync>,
    tokens: AtomicI64,
    /// Next refill instant, in nanoseconds since `origin`.
    next_refill: AtomicU64,
    refilling: AtomicBool,
    in_flight: AtomicUsize,
    origin: Instant,
}

impl FixedTokenBucket {
    pub fn new(capacity: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        Self {
            capacity: Box::new(capacity),
            tokens: AtomicI64::new(0),
            next_refill: AtomicU64::new(0),
            refilling: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            origin: Instant::now(),
        }
    }

    /// Current capacity in tokens per refill interval. Non-positive values
    /// mean unlimited; owners bypass the bucket in that case.
    pub fn capacity(&self) -> i64 {
        (self.capacity)()
    }

    /// Transfer rate equivalent of the capacity. The refill interval is one
    /// second, so the rate in bytes per second equals the capacity.
    pub fn rate(&self) -> i64 {
        self.capacity()
    }

    /// Tokens currently available.
    pub fn current_tokens(&self) -> i64 {
        self.refill();
        self.tokens.load(Ordering::Acquire)
    }

    /// Number of streams currently drawing from this bucket.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Decide whether a request for `requested` tokens must wait.
    ///
    /// Returns `None` when the tokens were consumed, or `Some(wait)` when the
    /// caller should back off. The wait is the time remaining until the next
    /// refill multiplied by the number of registered consumers: an
    /// over-estimate that spreads out wakeups when many streams share one
    /// bucket. Treat it as an upper-bound hint, not an exact release time.
    pub fn should_throttle(&self, requested: i64) -> Option<Duration> {
        self.refill();
        let available = self.tokens.load(Ordering::Acquire);
        if available < requested {
            let now = self.now_nanos();
            let next = self.next_refill.load(Ordering::Acquire);
            if next <= now {
                // Refill is due; let this request through unconsumed.
                return None;
            }
            let consumers = self.in_flight.load(Ordering::Acquire) as u64;
            return Some(Duration::from_nanos(
                (next - now).saturating_mul(consumers),
            ));
        }
        self.tokens.fetch_sub(requested, Ordering::AcqRel);
        None
    }

    /// Register a consuming stream for the wait-estimate heuristic. The
    /// registration is released when the returned guard drops, on every exit
    /// path including cancellation.
    pub fn register(self: &Arc<Self>) -> RegisteredConsumer {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        RegisteredConsumer {
            bucket: Arc::clone(self),
        }
    }

    fn now_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    /// Lazy refill: reset tokens to the current capacity once the refill
    /// instant has passed. The CAS flag makes racing refills collapse to one;
    /// a loser simply proceeds with its slightly stale view.
    fn refill(&self) {
        if self
            .refilling
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let now = self.now_nanos();
        if now >= self.next_refill.load(Ordering::Acquire) {
            self.tokens.store(self.capacity(), Ordering::Release);
            self.next_refill
                .store(now + REFILL_INTERVAL_NANOS, Ordering::Release);
        }
        self.refilling.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for FixedTokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedTokenBucket")
            .field("capacity", &self.capacity())
            .field("tokens", &self.tokens.load(Ordering::Relaxed))
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

/// Guard for one registered consumer; deregisters on drop.
pub struct RegisteredConsumer {
    bucket: Arc<FixedTokenBucket>,
}

impl Drop for RegisteredConsumer {
    fn drop(&mut self) {
        self.bucket.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_TOKENS: i64 = 10;

    fn bucket() -> FixedTokenBucket {
        FixedTokenBucket::new(|| MAX_TOKENS)
    }

    #[tokio::test(start_paused = true)]
    async fn consuming_less_than_capacity_never_throttles() {
        let bucket = bucket();

        assert!(bucket.should_throttle(2).is_none());
        assert_eq!(bucket.current_tokens(), MAX_TOKENS - 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cumulative_consumption_below_capacity_never_throttles() {
        let bucket = bucket();

        for _ in 0..2 {
            assert!(bucket.should_throttle(2).is_none());
        }
        assert_eq!(bucket.current_tokens(), MAX_TOKENS - 4);
    }

    #[tokio::test(start_paused = true)]
    async fn requesting_more_than_capacity_throttles_and_leaves_tokens() {
        let bucket = bucket();
        // Prime the bucket so the refill instant lies in the future.
        assert!(bucket.should_throttle(0).is_none());

        for _ in 0..2 {
            assert!(bucket.should_throttle(12).is_some());
        }
        assert_eq!(bucket.current_tokens(), MAX_TOKENS);
    }

    #[tokio::test(start_paused = true)]
    async fn refill_resets_to_capacity_regardless_of_prior_consumption() {
        let bucket = bucket();

        assert!(bucket.should_throttle(6).is_none());
        assert!(bucket.should_throttle(6).is_some());
        assert_eq!(bucket.current_tokens(), MAX_TOKENS - 6);

        tokio::time::advance(REFILL_INTERVAL).await;

        assert_eq!(bucket.current_tokens(), MAX_TOKENS);
        assert!(bucket.should_throttle(6).is_none());
        assert_eq!(bucket.current_tokens(), MAX_TOKENS - 6);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_estimate_scales_with_registered_consumers() {
        let bucket = Arc::new(bucket());
        assert!(bucket.should_throttle(MAX_TOKENS).is_none());

        let _first = bucket.register();
        let single = bucket.should_throttle(1).expect("should throttle");

        let _second = bucket.register();
        let doubled = bucket.should_throttle(1).expect("should throttle");

        assert!(doubled >= single);
        assert!(doubled <= single * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deregistration_releases_the_in_flight_count() {
        let bucket = Arc::new(bucket());

        let first = bucket.register();
        let second = bucket.register();
        assert_eq!(bucket.in_flight(), 2);

        drop(first);
        drop(second);
        assert_eq!(bucket.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_change_applies_at_the_next_refill() {
        let capacity = Arc::new(AtomicI64::new(10));
        let shared = Arc::clone(&capacity);
        let bucket = FixedTokenBucket::new(move || shared.load(Ordering::Relaxed));

        assert_eq!(bucket.current_tokens(), 10);
        capacity.store(40, Ordering::Relaxed);
        assert_eq!(bucket.current_tokens(), 10);

        tokio::time::advance(REFILL_INTERVAL).await;
        assert_eq!(bucket.current_tokens(), 40);
    }
}
