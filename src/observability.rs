//! Metric recording for governance decisions.
//!
//! Counters go through the `metrics` facade; installing a recorder and
//! exposing it is the host's concern.
//!
//! # Metrics
//! - `limitgate_rejections_total` (counter): rejected exchanges by limit and
//!   status code
//! - `limitgate_throttle_waits_total` (counter): throttle sleeps entered by
//!   shaped streams

use metrics::counter;

/// Record a rejected exchange.
pub fn record_rejection(limit: &'static str, status: u16) {
    counter!(
        "limitgate_rejections_total",
        "limit" => limit,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a throttle wait entered by a shaped stream.
pub fn record_throttle(limit: &'static str) {
    counter!("limitgate_throttle_waits_total", "limit" => limit).increment(1);
}
