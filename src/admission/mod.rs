//! Concurrency admission control.
//!
//! # Design Decisions
//! - Admission is a single atomic increment; there is no queue and no
//!   ordering guarantee across waiting exchanges — first past the counter
//!   wins
//! - The counter is released through an RAII permit on every exit path:
//!   success, downstream failure, rejection and cancellation
//! - Rejection is silent: 503 on the exchange status, no error escapes

mod concurrency;

pub use concurrency::{ConcurrencyGate, GatePermit, MaxConcurrentRequests};
