//! Bandwidth shaping.
//!
//! # Data Flow
//! ```text
//! Exchange:
//!     → bandwidth.rs stage (per-request buckets, or shared global buckets)
//!         → wraps request/response streams in throttled.rs decorators
//!             → every write consults token_bucket.rs before reaching the
//!               inner stream
//! ```
//!
//! # Design Decisions
//! - Token consumption and refill are lock-free; a slow exchange never
//!   serializes unrelated exchanges behind a mutex
//! - Rates are resampled on every throttling decision, so a live capacity
//!   change takes effect mid-transfer
//! - Capacity ≤ 0 means unlimited and bypasses the bucket entirely

mod bandwidth;
mod throttled;
mod token_bucket;

pub use bandwidth::{MaxBandwidthGlobal, MaxBandwidthPerRequest};
pub use throttled::ThrottledStream;
pub use token_bucket::{FixedTokenBucket, RegisteredConsumer};
