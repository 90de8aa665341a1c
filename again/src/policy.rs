//! Retry policy configuration.

use crate::backoff::FibonacciBackoff;
use crate::cause::NoRetrySet;
use crate::error::{RetryError, RetryResult};
use crate::executor::{with_retry_cancellable, with_retry_state, RetryState};
use futures::future::{BoxFuture, FutureExt};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Callback told about every failed attempt that enters the retry mechanism.
pub type AttemptObserver = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

/// Last-resort operation run once the retry budget is spent.
pub type Fallback<T> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// How to retry an operation.
///
/// Every builder method consumes the policy and hands back the updated value,
/// so a partially configured policy can be cloned and used as a template:
///
/// ```ignore
/// let base = Policy::new().first_retry_delay(Duration::from_millis(50));
/// let patient = base.clone().max_retries(10);
/// let quick = base.max_retries(1);
/// ```
///
/// Running never mutates the policy, so one value can drive any number of
/// concurrent runs.
pub struct Policy<T> {
    max_retries: u32,
    first_retry_delay: Duration,
    max_delay: Option<Duration>,
    no_retry: NoRetrySet,
    on_attempt_failure: Option<AttemptObserver>,
    fallback: Option<Fallback<T>>,
}

impl<T> Default for Policy<T> {
    fn default() -> Self {
        Self {
            max_retries: 1,
            first_retry_delay: Duration::from_secs(1),
            max_delay: None,
            no_retry: NoRetrySet::new(),
            on_attempt_failure: None,
            fallback: None,
        }
    }
}

impl<T> Clone for Policy<T> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            first_retry_delay: self.first_retry_delay,
            max_delay: self.max_delay,
            no_retry: self.no_retry.clone(),
            on_attempt_failure: self.on_attempt_failure.clone(),
            fallback: self.fallback.clone(),
        }
    }
}

impl<T> fmt::Debug for Policy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("max_retries", &self.max_retries)
            .field("first_retry_delay", &self.first_retry_delay)
            .field("max_delay", &self.max_delay)
            .field("no_retry", &self.no_retry)
            .field("has_observer", &self.on_attempt_failure.is_some())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl<T> Policy<T> {
    /// Create a policy with one retry and a one second first delay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry budget. Total attempts are `1 + n`.
    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the delay between the first attempt and the first retry.
    ///
    /// Later delays follow the Fibonacci sequence from this seed. A zero seed
    /// is accepted here and rejected when the policy runs.
    #[must_use]
    pub fn first_retry_delay(mut self, delay: Duration) -> Self {
        self.first_retry_delay = delay;
        self
    }

    /// Cap every backoff delay.
    #[must_use]
    pub fn max_delay(mut self, max: Duration) -> Self {
        self.max_delay = Some(max);
        self
    }

    /// Stop retrying as soon as a failure's root cause equals `sentinel`.
    ///
    /// Calls accumulate. See [`crate::cause`] for how causes are compared.
    #[must_use]
    pub fn do_not_retry_on<S>(mut self, sentinel: S) -> Self
    where
        S: StdError + PartialEq + Send + Sync + 'static,
    {
        self.no_retry.push(sentinel);
        self
    }

    /// Register several sentinels of one type at once.
    #[must_use]
    pub fn do_not_retry_on_all<S, I>(mut self, sentinels: I) -> Self
    where
        S: StdError + PartialEq + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
    {
        self.no_retry.extend(sentinels);
        self
    }

    /// Observe every failed attempt, including the last one.
    ///
    /// Not called for failures that hit the no-retry set.
    #[must_use]
    pub fn on_attempt_failure<F>(mut self, observer: F) -> Self
    where
        F: Fn(&anyhow::Error) + Send + Sync + 'static,
    {
        self.on_attempt_failure = Some(Arc::new(observer));
        self
    }

    /// Run `fallback` once if every attempt fails.
    #[must_use]
    pub fn fallback<F, Fut, E>(mut self, fallback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error>,
        T: Send + 'static,
    {
        self.fallback = Some(Arc::new(move || {
            fallback().map(|result| result.map_err(Into::into)).boxed()
        }));
        self
    }

    /// Check the policy without running anything.
    pub fn validate(&self) -> RetryResult<()> {
        if self.first_retry_delay.is_zero() {
            return Err(RetryError::InvalidDelay);
        }
        Ok(())
    }

    /// Configured retry budget.
    pub fn get_max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Configured backoff seed.
    pub fn get_first_retry_delay(&self) -> Duration {
        self.first_retry_delay
    }

    /// Configured backoff cap.
    pub fn get_max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Upper bound on attempts for one run.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Sentinels that stop retrying.
    pub fn no_retry_set(&self) -> &NoRetrySet {
        &self.no_retry
    }

    /// Whether an attempt observer is set.
    pub fn has_observer(&self) -> bool {
        self.on_attempt_failure.is_some()
    }

    /// Whether a fallback is set.
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Fresh backoff sequence for one run.
    pub fn backoff(&self) -> FibonacciBackoff {
        let backoff = FibonacciBackoff::new(self.first_retry_delay);
        match self.max_delay {
            Some(max) => backoff.with_max_delay(max),
            None => backoff,
        }
    }

    pub(crate) fn observer(&self) -> Option<&AttemptObserver> {
        self.on_attempt_failure.as_ref()
    }

    pub(crate) fn fallback_op(&self) -> Option<&Fallback<T>> {
        self.fallback.as_ref()
    }

    /// Run `operation` under this policy.
    pub async fn run<F, Fut, E>(&self, operation: F) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        with_retry_cancellable(self, &CancellationToken::new(), operation).await
    }

    /// Run `operation`, giving up during a backoff wait once `cancel` fires.
    pub async fn run_with_cancel<F, Fut, E>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        with_retry_cancellable(self, cancel, operation).await
    }

    /// Run `operation` and also return what happened along the way.
    pub async fn run_with_state<F, Fut, E>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> (RetryResult<T>, RetryState)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        with_retry_state(self, cancel, operation).await
    }
}
