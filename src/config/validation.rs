//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits meaningful)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: LimitsConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use super::schema::LimitsConfig;

/// One violated constraint in a parsed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

fn violation(errors: &mut Vec<ValidationError>, field: &'static str, message: impl Into<String>) {
    errors.push(ValidationError {
        field,
        message: message.into(),
    });
}

/// Check a parsed configuration for semantic errors.
///
/// In code, non-positive rates and ceilings mean unlimited; in a config file
/// the way to say unlimited is to omit the key, so those values are treated
/// as mistakes here.
pub fn validate_config(config: &LimitsConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(ceiling) = config.max_concurrent_requests {
        if ceiling <= 0 {
            violation(
                &mut errors,
                "max_concurrent_requests",
                "must be positive; omit the key for no limit",
            );
        }
    }
    if let Some(rate) = config.max_bandwidth_per_request {
        if rate <= 0 {
            violation(
                &mut errors,
                "max_bandwidth_per_request",
                "must be positive; omit the key for no limit",
            );
        }
    }
    if let Some(rate) = config.max_bandwidth_global {
        if rate <= 0 {
            violation(
                &mut errors,
                "max_bandwidth_global",
                "must be positive; omit the key for no limit",
            );
        }
    }
    if config.max_url_length == Some(0) {
        // A URL is never empty, so a zero limit rejects every exchange.
        violation(&mut errors, "max_url_length", "must be positive");
    }
    if config.connection_timeout_secs == Some(0) {
        violation(
            &mut errors,
            "connection_timeout_secs",
            "must be greater than zero",
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
