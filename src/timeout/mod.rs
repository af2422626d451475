//! Idle-timeout enforcement on exchange streams.
//!
//! # Data Flow
//! ```text
//! Exchange:
//!     → ConnectionTimeout stage (one watchdog per exchange)
//!         → TimeoutStream over the request-read side  ─┐ shared
//!         → TimeoutStream over the response-write side ┘ budget
//! ```
//!
//! # Design Decisions
//! - Both directions share one reset-on-activity budget seeded at wrap time
//! - Disposal is terminal and idempotent; pending operations are unblocked
//!   with a typed stream-disposed failure, never left hanging
//! - Timeout failures are distinct from generic I/O errors so callers can
//!   log them separately

mod idle;

pub use idle::{ConnectionTimeout, IdleWatchdog, TimeoutStream};
