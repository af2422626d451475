//! Configuration for assembling a governed pipeline.
//!
//! # Data Flow
//! ```text
//! limits.toml
//!     → loader.rs (read, parse)
//!     → validation.rs (semantic checks, all errors reported)
//!     → build_pipeline (stage per configured limit)
//! ```
//!
//! # Design Decisions
//! - Serde handles syntax; validation is a pure function over the parsed
//!   schema and returns every violation, not just the first
//! - Absent limits mean absent stages; a default config builds an empty
//!   pipeline

mod loader;
mod schema;
mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::LimitsConfig;
pub use validation::{validate_config, ValidationError};

use std::time::Duration;

use crate::admission::MaxConcurrentRequests;
use crate::delay::MinResponseDelay;
use crate::pipeline::Pipeline;
use crate::rate::{MaxBandwidthGlobal, MaxBandwidthPerRequest};
use crate::timeout::ConnectionTimeout;
use crate::validate::{MaxQueryStringLength, MaxRequestContentLength, MaxUrlLength};

/// Build a pipeline with one stage per configured limit.
///
/// Stage order: cheap validators first, then admission, then the stages that
/// act on the exchange's streams and timing.
pub fn build_pipeline(config: &LimitsConfig) -> Pipeline {
    let mut pipeline = Pipeline::new();

    if let Some(max) = config.max_url_length {
        pipeline = pipeline.stage(MaxUrlLength::new(max));
    }
    if let Some(max) = config.max_query_string_length {
        pipeline = pipeline.stage(MaxQueryStringLength::new(max));
    }
    if let Some(max) = config.max_request_content_length {
        pipeline = pipeline.stage(MaxRequestContentLength::new(max));
    }
    if let Some(max) = config.max_concurrent_requests {
        pipeline = pipeline.stage(MaxConcurrentRequests::new(max));
    }
    if let Some(delay_ms) = config.min_response_delay_ms {
        pipeline = pipeline.stage(MinResponseDelay::new(Duration::from_millis(delay_ms)));
    }
    if let Some(timeout_secs) = config.connection_timeout_secs {
        pipeline = pipeline.stage(ConnectionTimeout::new(Duration::from_secs(timeout_secs)));
    }
    if let Some(rate) = config.max_bandwidth_global {
        pipeline = pipeline.stage(MaxBandwidthGlobal::new(rate));
    }
    if let Some(rate) = config.max_bandwidth_per_request {
        pipeline = pipeline.stage(MaxBandwidthPerRequest::new(rate));
    }

    pipeline
}
