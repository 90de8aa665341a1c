//! Fibonacci backoff.
//!
//! Delays grow as `d, d, 2d, 3d, 5d, 8d, ...` where `d` is the seed. Growth is
//! slower than doubling but still superlinear.

use std::time::Duration;

/// Fibonacci backoff seeded by the first retry delay.
///
/// The value itself is a two-register iterator: every call to
/// [`Iterator::next`] yields the next delay. [`FibonacciBackoff::delay`] gives
/// the same sequence as a pure function of the retry index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FibonacciBackoff {
    current: Duration,
    next: Duration,
    max_delay: Option<Duration>,
}

impl FibonacciBackoff {
    /// Create a new backoff starting at `seed`.
    #[must_use]
    pub fn new(seed: Duration) -> Self {
        Self {
            current: seed,
            next: seed,
            max_delay: None,
        }
    }

    /// Cap every yielded delay at `max`.
    #[must_use]
    pub fn with_max_delay(mut self, max: Duration) -> Self {
        self.max_delay = Some(max);
        self
    }

    /// Delay before retry number `index` (0-based) for the given seed.
    ///
    /// Saturates at [`Duration::MAX`] instead of overflowing.
    pub fn delay(seed: Duration, index: u32) -> Duration {
        let (mut a, mut b) = (seed, seed);
        for _ in 0..index {
            let sum = a.saturating_add(b);
            a = b;
            b = sum;
        }
        a
    }

    /// Same as [`FibonacciBackoff::delay`] but applies this backoff's cap.
    pub fn calculate_delay(&self, seed: Duration, index: u32) -> Duration {
        self.cap(Self::delay(seed, index))
    }

    /// Delay the next call to `next` will yield.
    pub fn peek(&self) -> Duration {
        self.cap(self.current)
    }

    fn cap(&self, delay: Duration) -> Duration {
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

impl Iterator for FibonacciBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.peek();
        let sum = self.current.saturating_add(self.next);
        self.current = self.next;
        self.next = sum;
        Some(delay)
    }
}
