//! Error-cause classification.
//!
//! Failures are matched against the no-retry set by their *root cause*: the
//! innermost error reached by following [`std::error::Error::source`]. An
//! error stays matchable when it is wrapped with `anyhow::Context` or stored
//! in a `#[source]` field. It stops being matchable once it is flattened into
//! a string (`anyhow!("{err}")`), since the chain is gone.
//!
//! A sentinel is any `Error + PartialEq` value, typically a unit variant of an
//! error enum. The root cause is downcast to the sentinel's concrete type and
//! then compared by value, so `StoreError::NotFound` and
//! `StoreError::Conflict` are distinct sentinels even though they share a
//! type.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

type CauseMatcher = Arc<dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync>;

/// Follow the `source()` chain of `error` to its innermost cause.
pub fn root_cause(error: &anyhow::Error) -> &(dyn StdError + 'static) {
    error.root_cause()
}

/// Check whether the root cause of `error` equals `sentinel`.
pub fn is_caused_by<S>(error: &anyhow::Error, sentinel: &S) -> bool
where
    S: StdError + PartialEq + Send + Sync + 'static,
{
    root_cause(error)
        .downcast_ref::<S>()
        .is_some_and(|cause| cause == sentinel)
}

#[derive(Clone)]
struct Sentinel {
    description: String,
    matches: CauseMatcher,
}

/// Sentinel errors that stop a retry loop immediately.
///
/// Adding is additive: sentinels are never replaced or removed.
#[derive(Clone, Default)]
pub struct NoRetrySet {
    sentinels: Vec<Sentinel>,
}

impl NoRetrySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sentinel.
    pub fn push<S>(&mut self, sentinel: S)
    where
        S: StdError + PartialEq + Send + Sync + 'static,
    {
        self.sentinels.push(Sentinel {
            description: sentinel.to_string(),
            matches: Arc::new(move |cause| cause.downcast_ref::<S>() == Some(&sentinel)),
        });
    }

    /// Check whether the root cause of `error` is one of the sentinels.
    pub fn matches(&self, error: &anyhow::Error) -> bool {
        self.matches_cause(root_cause(error))
    }

    /// Check an already unwrapped cause against the sentinels.
    pub fn matches_cause(&self, cause: &(dyn StdError + 'static)) -> bool {
        self.sentinels.iter().any(|sentinel| (sentinel.matches)(cause))
    }

    /// Number of registered sentinels.
    pub fn len(&self) -> usize {
        self.sentinels.len()
    }

    /// Whether no sentinels are registered.
    pub fn is_empty(&self) -> bool {
        self.sentinels.is_empty()
    }

    /// Display strings of the registered sentinels, in registration order.
    pub fn descriptions(&self) -> impl Iterator<Item = &str> {
        self.sentinels.iter().map(|s| s.description.as_str())
    }
}

impl<S> Extend<S> for NoRetrySet
where
    S: StdError + PartialEq + Send + Sync + 'static,
{
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for sentinel in iter {
            self.push(sentinel);
        }
    }
}

impl fmt::Debug for NoRetrySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.descriptions()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use thiserror::Error;

    #[derive(Debug, Error, Clone, PartialEq, Eq)]
    enum StoreError {
        #[error("not found")]
        NotFound,
        #[error("conflict")]
        Conflict,
    }

    #[derive(Debug, Error, PartialEq)]
    #[error("timed out")]
    struct Timeout;

    #[derive(Debug, Error)]
    #[error("lookup failed")]
    struct LookupError {
        #[source]
        source: StoreError,
    }

    fn set_with_not_found() -> NoRetrySet {
        let mut set = NoRetrySet::new();
        set.push(StoreError::NotFound);
        set
    }

    #[test]
    fn test_matches_bare_sentinel() {
        let set = set_with_not_found();
        assert!(set.matches(&anyhow::Error::new(StoreError::NotFound)));
    }

    #[test]
    fn test_matches_through_context() {
        let set = set_with_not_found();
        let error = Err::<(), _>(StoreError::NotFound)
            .context("loading user")
            .context("handling request")
            .unwrap_err();

        assert!(set.matches(&error));
        assert_eq!(root_cause(&error).to_string(), "not found");
    }

    #[test]
    fn test_matches_through_source_field() {
        let set = set_with_not_found();
        let error = anyhow::Error::new(LookupError {
            source: StoreError::NotFound,
        });

        assert!(set.matches(&error));
        assert!(is_caused_by(&error, &StoreError::NotFound));
    }

    #[test]
    fn test_compares_values_not_types() {
        let set = set_with_not_found();
        assert!(!set.matches(&anyhow::Error::new(StoreError::Conflict)));
        assert!(!set.matches(&anyhow::Error::new(Timeout)));
    }

    #[test]
    fn test_flattened_error_loses_its_cause() {
        let set = set_with_not_found();
        let flattened = anyhow::anyhow!("{}", StoreError::NotFound);
        assert!(!set.matches(&flattened));
    }

    #[test]
    fn test_wrapper_is_not_the_root() {
        let mut set = NoRetrySet::new();
        set.push(Timeout);
        let error = anyhow::Error::new(Timeout).context(StoreError::Conflict);

        // The context layer is outermost, the sentinel is the root.
        assert!(set.matches(&error));
        assert!(!is_caused_by(&error, &StoreError::Conflict));
    }

    #[test]
    fn test_extend_is_additive() {
        let mut set = set_with_not_found();
        set.extend([StoreError::Conflict]);
        set.push(Timeout);

        assert_eq!(set.len(), 3);
        assert!(set.matches(&anyhow::Error::new(StoreError::NotFound)));
        assert!(set.matches(&anyhow::Error::new(StoreError::Conflict)));
        assert!(set.matches(&anyhow::Error::new(Timeout)));
        assert_eq!(format!("{set:?}"), r#"["not found", "conflict", "timed out"]"#);
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let set = NoRetrySet::new();
        assert!(set.is_empty());
        assert!(!set.matches(&anyhow::Error::new(StoreError::NotFound)));
    }
}
