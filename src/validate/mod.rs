//! Stateless request guards.
//!
//! # Responsibilities
//! - Enforce maximum URL and query-string length (decoded before measuring)
//! - Enforce maximum request body size via the Content-Length header and a
//!   byte-counting stream for chunked bodies
//!
//! # Design Decisions
//! - Percent-escapes are decoded before measuring, so an escaped-but-short
//!   URL is never falsely rejected
//! - Rejections are silent: 411/413/414 on the exchange status, nothing
//!   escapes the stage

mod content_length;
mod query_string;
mod url_length;

pub use content_length::{LengthLimitedStream, MaxRequestContentLength};
pub use query_string::MaxQueryStringLength;
pub use url_length::MaxUrlLength;

use percent_encoding::percent_decode_str;

/// Length of `raw` after decoding percent-escapes, in characters.
fn decoded_len(raw: &str) -> usize {
    percent_decode_str(raw).decode_utf8_lossy().chars().count()
}
