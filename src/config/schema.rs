//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every limit is optional; an absent key means the corresponding stage is
//! not built at all.

use serde::{Deserialize, Serialize};

/// Declarative limit set for one governed pipeline.
///
/// Constants only: limits whose value depends on the request (per-host
/// budgets and the like) are wired in code through the `with_provider`
/// constructors instead.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum simultaneous exchanges; excess is rejected with 503.
    pub max_concurrent_requests: Option<i64>,

    /// Transfer budget per exchange, in bytes per second per direction.
    pub max_bandwidth_per_request: Option<i64>,

    /// Transfer budget shared by all exchanges, in bytes per second per
    /// direction.
    pub max_bandwidth_global: Option<i64>,

    /// Maximum decoded absolute URL length, in characters.
    pub max_url_length: Option<usize>,

    /// Maximum decoded query-string length, in characters.
    pub max_query_string_length: Option<usize>,

    /// Maximum request body size, in bytes. Zero allows no body at all.
    pub max_request_content_length: Option<u64>,

    /// Idle timeout applied to both body streams, in seconds.
    pub connection_timeout_secs: Option<u64>,

    /// Fixed delay before downstream runs, in milliseconds.
    pub min_response_delay_ms: Option<u64>,
}
