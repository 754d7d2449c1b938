//! Error types for throttle reconfiguration.
//!
//! Denying a permit is not an error: `acquire` simply returns `false`. The
//! only failure a caller can see is an attempt to configure a rate the
//! bucket cannot represent.

use super::config::MAX_RATE;
use thiserror::Error;

/// Result alias for throttle operations that can fail.
pub type ThrottleResult<T> = Result<T, ThrottleError>;

/// Errors reported synchronously by rate setters and config validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ThrottleError {
    /// The requested rate is negative or above [`MAX_RATE`].
    ///
    /// No state is changed when this is returned.
    #[error("invalid rate {rate}: must be between 0 and {max} permits per second")]
    InvalidRate {
        /// The rejected value as supplied by the caller.
        rate: i64,
        /// Largest rate a bucket accepts.
        max: u32,
    },
}

impl ThrottleError {
    pub(crate) fn invalid_rate(rate: i64) -> Self {
        Self::InvalidRate {
            rate,
            max: MAX_RATE,
        }
    }
}

/// Converts a caller-supplied rate into a bucket capacity.
pub(crate) fn checked_rate(rate: i64) -> ThrottleResult<u32> {
    if (0..=MAX_RATE as i64).contains(&rate) {
        Ok(rate as u32)
    } else {
        Err(ThrottleError::invalid_rate(rate))
    }
}
