//! Typed failures raised by the governance layer.
//!
//! Stream decorators operate behind `AsyncRead`/`AsyncWrite`, so failures
//! cross that boundary inside an [`std::io::Error`]. The payload stays
//! downcastable: stages and callers use [`LimitError::from_io`] to tell an
//! idle-timeout disposal or a length overrun apart from a generic transport
//! failure.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy for governed exchanges.
#[derive(Debug, Error)]
pub enum LimitError {
    /// A body byte arrived on a request that was required to declare a length.
    #[error("request body requires a content length")]
    ContentLengthRequired,

    /// The cumulative request body size passed the configured maximum.
    #[error("request body exceeded the allowed maximum of {max} bytes")]
    ContentLengthExceeded { max: u64 },

    /// The idle watchdog fired and the stream was disposed.
    #[error("stream disposed after {timeout:?} without activity")]
    IdleTimeout { timeout: Duration },

    /// The exchange was cancelled while an operation was suspended.
    #[error("exchange cancelled")]
    Cancelled,
}

impl LimitError {
    /// Recover the typed failure from an I/O error produced by a governed
    /// stream, if there is one.
    pub fn from_io(err: &io::Error) -> Option<&LimitError> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<LimitError>())
    }
}

impl From<LimitError> for io::Error {
    fn from(err: LimitError) -> Self {
        let kind = match err {
            LimitError::ContentLengthRequired | LimitError::ContentLengthExceeded { .. } => {
                io::ErrorKind::InvalidData
            }
            LimitError::IdleTimeout { .. } => io::ErrorKind::TimedOut,
            LimitError::Cancelled => io::ErrorKind::Interrupted,
        };
        io::Error::new(kind, err)
    }
}
