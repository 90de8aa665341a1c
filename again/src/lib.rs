//! # again
//!
//! Retry an operation with Fibonacci backoff, fail fast on chosen errors and
//! fall back to a last-resort operation when every attempt fails.
//!
//! ## Core Concepts
//!
//! - **[`Policy`]**: Retry budget, first delay, no-retry sentinels, observer
//!   and fallback
//! - **[`FibonacciBackoff`]**: Delays of `d, d, 2d, 3d, 5d, ...`
//! - **[`NoRetrySet`]**: Sentinel errors matched against a failure's root cause
//! - **[`with_retry`]**: Execute operations with automatic retries
//! - **[`RetrySettings`]**: Serializable form of the plain-data settings
//!
//! ## How a run ends
//!
//! - an attempt succeeds: `Ok(value)`
//! - the first delay is zero: [`RetryError::InvalidDelay`], nothing runs
//! - a failure's root cause is a sentinel: [`RetryError::NonRetryable`] right
//!   away, with no observer call and no fallback
//! - attempts run out: the fallback's value, [`RetryError::Fallback`] if it
//!   fails too, or [`RetryError::Exhausted`] when there is no fallback
//! - the cancellation token fires during a backoff wait:
//!   [`RetryError::Cancelled`]
//!
//! ## Example
//!
//! ```ignore
//! use again::Policy;
//! use std::time::Duration;
//!
//! let policy = Policy::new()
//!     .first_retry_delay(Duration::from_millis(100))
//!     .max_retries(3)
//!     .do_not_retry_on(StoreError::NotFound)
//!     .on_attempt_failure(|err| tracing::warn!(error = %err, "attempt failed"))
//!     .fallback(|| async { load_from_cache().await });
//!
//! let user = policy.run(|| async { fetch_user(42).await }).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod backoff;
pub mod cause;
pub mod error;
pub mod executor;
pub mod policy;
pub mod settings;

// Re-exports
pub use backoff::FibonacciBackoff;
pub use cause::{is_caused_by, root_cause, NoRetrySet};
pub use error::{RetryError, RetryResult};
pub use executor::{
    with_retry, with_retry_cancellable, with_retry_state, AttemptInfo, Retry, RetryOutcome,
    RetryState,
};
pub use policy::{AttemptObserver, Fallback, Policy};
pub use settings::RetrySettings;
pub use tokio_util::sync::CancellationToken;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        with_retry, CancellationToken, FibonacciBackoff, Policy, Retry, RetryError, RetryResult,
        RetrySettings,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq)]
    #[error("error not to retry on")]
    struct Sentinel;

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let policy = Policy::<()>::new().max_retries(5);
        assert_eq!(policy.get_max_retries(), 5);
    }

    #[tokio::test]
    async fn test_fails_once_then_succeeds() {
        let runs = Arc::new(AtomicU32::new(0));
        let observed = Arc::new(AtomicU32::new(0));
        let (counter, seen) = (runs.clone(), observed.clone());

        let result = Policy::new()
            .first_retry_delay(Duration::from_millis(1))
            .max_retries(1)
            .on_attempt_failure(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .run(|| {
                let run = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if run == 0 {
                        Err(anyhow::anyhow!("transient"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sentinel_fails_fast() {
        let runs = Arc::new(AtomicU32::new(0));
        let observed = Arc::new(AtomicU32::new(0));
        let (counter, seen) = (runs.clone(), observed.clone());

        let err = Policy::new()
            .first_retry_delay(Duration::from_millis(1))
            .max_retries(1)
            .do_not_retry_on(Sentinel)
            .on_attempt_failure(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .run(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Sentinel) }
            })
            .await
            .unwrap_err();

        assert!(is_caused_by(err.inner().unwrap(), &Sentinel));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(observed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_rescues_exhausted_run() {
        let fallback_runs = Arc::new(AtomicU32::new(0));
        let counter = fallback_runs.clone();

        let result = Policy::new()
            .first_retry_delay(Duration::from_millis(1))
            .max_retries(1)
            .fallback(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, anyhow::Error>(()) }
            })
            .run(|| async { Err::<(), _>(anyhow::anyhow!("always")) })
            .await;

        assert!(result.is_ok());
        assert_eq!(fallback_runs.load(Ordering::SeqCst), 1);
    }
}
