//! Terminal error types.

use std::error::Error as StdError;
use thiserror::Error;

/// Why a retry run ended without a value.
#[derive(Debug, Error)]
pub enum RetryError {
    /// The first retry delay was zero. No attempt was made.
    #[error("first retry delay must be greater than zero, no attempt was made")]
    InvalidDelay,

    /// The failure's root cause is in the no-retry set. Returned as-is.
    #[error(transparent)]
    NonRetryable(anyhow::Error),

    /// Every attempt failed and no fallback was configured.
    #[error(transparent)]
    Exhausted(anyhow::Error),

    /// Every attempt failed and so did the fallback.
    #[error("error in fallback: {0}")]
    Fallback(#[source] anyhow::Error),

    /// Cancelled while waiting between attempts.
    #[error("retry cancelled after {attempts} attempt(s): {last}")]
    Cancelled {
        /// Attempts made before cancellation.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        last: anyhow::Error,
    },
}

impl RetryError {
    /// Whether the policy itself was invalid.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidDelay)
    }

    /// Whether a sentinel short-circuited the loop.
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, Self::NonRetryable(_))
    }

    /// Whether the retry budget ran out without a fallback.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }

    /// Whether the fallback ran and failed.
    pub fn is_fallback_failure(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// Whether the run was cancelled during a backoff wait.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The underlying operation or fallback error, if any.
    pub fn inner(&self) -> Option<&anyhow::Error> {
        match self {
            Self::InvalidDelay => None,
            Self::NonRetryable(e) | Self::Exhausted(e) | Self::Fallback(e) => Some(e),
            Self::Cancelled { last, .. } => Some(last),
        }
    }

    /// Consume into the underlying error, if any.
    pub fn into_inner(self) -> Option<anyhow::Error> {
        match self {
            Self::InvalidDelay => None,
            Self::NonRetryable(e) | Self::Exhausted(e) | Self::Fallback(e) => Some(e),
            Self::Cancelled { last, .. } => Some(last),
        }
    }

    /// Root cause of the underlying error, if any.
    pub fn root_cause(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner().map(crate::cause::root_cause)
    }
}

/// Result type for retry runs.
pub type RetryResult<T> = Result<T, RetryError>;
