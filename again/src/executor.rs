//! Retry executor for running operations under a [`Policy`].

use crate::error::{RetryError, RetryResult};
use crate::policy::Policy;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Terminal state a run ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// An attempt succeeded.
    Success,
    /// The policy was rejected before any attempt.
    InvalidDelay,
    /// A sentinel error stopped the loop.
    NonRetryable,
    /// All attempts failed and there was no fallback.
    Exhausted,
    /// All attempts failed and the fallback succeeded.
    FallbackSucceeded,
    /// All attempts failed and so did the fallback.
    FallbackFailed,
    /// Cancelled during a backoff wait.
    Cancelled,
}

/// State of a retry run.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Attempts made so far (1-indexed, 0 before the first).
    pub attempt: u32,
    /// Last error message.
    pub last_error: Option<String>,
    /// Total time spent waiting.
    pub total_wait_time: Duration,
    /// History of attempts.
    pub history: Vec<AttemptInfo>,
    /// Whether the fallback was invoked.
    pub fallback_invoked: bool,
    /// How the run ended.
    pub outcome: Option<RetryOutcome>,
}

impl RetryState {
    fn record(&mut self, error: Option<&anyhow::Error>, wait_time: Duration) {
        let error = error.map(|e| format!("{e:#}"));
        if error.is_some() {
            self.last_error.clone_from(&error);
        }
        self.total_wait_time += wait_time;
        self.history.push(AttemptInfo {
            attempt: self.attempt,
            success: error.is_none(),
            error,
            wait_time,
        });
    }

    /// Number of failed attempts in the history.
    pub fn failures(&self) -> usize {
        self.history.iter().filter(|a| !a.success).count()
    }
}

/// Information about a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptInfo {
    /// Attempt number.
    pub attempt: u32,
    /// Whether it succeeded.
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Time waited after this attempt before the next one.
    pub wait_time: Duration,
}

/// Execute an operation with retries.
///
/// # Example
///
/// ```ignore
/// use again::{with_retry, Policy};
/// use std::time::Duration;
///
/// let policy = Policy::new()
///     .max_retries(3)
///     .first_retry_delay(Duration::from_millis(100));
///
/// let body = with_retry(&policy, || async {
///     fetch_page().await
/// }).await?;
/// ```
pub async fn with_retry<F, Fut, T, E>(policy: &Policy<T>, operation: F) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    with_retry_cancellable(policy, &CancellationToken::new(), operation).await
}

/// Execute with retries, abandoning the run if `cancel` fires during a wait.
pub async fn with_retry_cancellable<F, Fut, T, E>(
    policy: &Policy<T>,
    cancel: &CancellationToken,
    operation: F,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let mut state = RetryState::default();
    execute(policy, cancel, operation, &mut state).await
}

/// Execute with retries and get state information.
pub async fn with_retry_state<F, Fut, T, E>(
    policy: &Policy<T>,
    cancel: &CancellationToken,
    operation: F,
) -> (RetryResult<T>, RetryState)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let mut state = RetryState::default();
    let result = execute(policy, cancel, operation, &mut state).await;
    (result, state)
}

async fn execute<F, Fut, T, E>(
    policy: &Policy<T>,
    cancel: &CancellationToken,
    mut operation: F,
    state: &mut RetryState,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    if let Err(error) = policy.validate() {
        warn!(
            first_retry_delay_ms = policy.get_first_retry_delay().as_millis(),
            "Invalid retry policy"
        );
        state.outcome = Some(RetryOutcome::InvalidDelay);
        return Err(error);
    }

    let max_attempts = policy.max_attempts();
    let mut backoff = policy.backoff();

    let last_error = loop {
        state.attempt += 1;

        debug!(
            attempt = state.attempt,
            max_attempts,
            max_retries = policy.get_max_retries(),
            "Executing retry attempt"
        );

        let error: anyhow::Error = match operation().await {
            Ok(value) => {
                state.record(None, Duration::ZERO);
                state.outcome = Some(RetryOutcome::Success);
                return Ok(value);
            }
            Err(error) => error.into(),
        };

        if policy.no_retry_set().matches(&error) {
            debug!(
                attempt = state.attempt,
                error = %error,
                "Error is marked as non-retryable"
            );
            state.record(Some(&error), Duration::ZERO);
            state.outcome = Some(RetryOutcome::NonRetryable);
            return Err(RetryError::NonRetryable(error));
        }

        if let Some(observer) = policy.observer() {
            observer(&error);
        }

        if state.attempt >= max_attempts {
            state.record(Some(&error), Duration::ZERO);
            break error;
        }

        let wait = backoff.next().unwrap_or(Duration::MAX);
        state.record(Some(&error), wait);

        debug!(
            attempt = state.attempt,
            wait_ms = wait.as_millis(),
            error = %error,
            "Waiting before retry"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(attempt = state.attempt, "Retry cancelled during backoff");
                state.outcome = Some(RetryOutcome::Cancelled);
                return Err(RetryError::Cancelled {
                    attempts: state.attempt,
                    last: error,
                });
            }
            () = sleep(wait) => {}
        }
    };

    warn!(
        attempts = state.attempt,
        error = %last_error,
        fallback = policy.has_fallback(),
        "Retry exhausted"
    );

    let Some(fallback) = policy.fallback_op() else {
        state.outcome = Some(RetryOutcome::Exhausted);
        return Err(RetryError::Exhausted(last_error));
    };

    state.fallback_invoked = true;
    match fallback().await {
        Ok(value) => {
            debug!(attempts = state.attempt, "Fallback succeeded");
            state.outcome = Some(RetryOutcome::FallbackSucceeded);
            Ok(value)
        }
        Err(error) => {
            warn!(error = %error, "Fallback failed");
            state.outcome = Some(RetryOutcome::FallbackFailed);
            Err(RetryError::Fallback(error))
        }
    }
}

/// Runner binding a policy to an optional cancellation token.
pub struct Retry<'a, T> {
    policy: &'a Policy<T>,
    cancel: CancellationToken,
}

impl<'a, T> Retry<'a, T> {
    /// Create a new runner.
    pub fn new(policy: &'a Policy<T>) -> Self {
        Self {
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Abandon runs when `token` is cancelled.
    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the operation with retries.
    pub async fn run<F, Fut, E>(self, operation: F) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        with_retry_cancellable(self.policy, &self.cancel, operation).await
    }

    /// Run and get state.
    pub async fn run_with_state<F, Fut, E>(self, operation: F) -> (RetryResult<T>, RetryState)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        with_retry_state(self.policy, &self.cancel, operation).await
    }
}
