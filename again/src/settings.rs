//! Serializable retry settings.
//!
//! `RetrySettings` carries the plain-data part of a [`Policy`] so it can live
//! in a config file. Sentinels, observers and fallbacks are code and are added
//! to the policy after conversion.

use crate::policy::Policy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Plain-data retry configuration.
///
/// Durations are written in seconds, fractional values allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retry budget. Total attempts are `1 + max_retries`.
    pub max_retries: u32,

    /// Delay before the first retry.
    #[serde(with = "duration_serde")]
    pub first_retry_delay: Duration,

    /// Cap on any single backoff delay.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub max_delay: Option<Duration>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 1,
            first_retry_delay: Duration::from_secs(1),
            max_delay: None,
        }
    }
}

impl RetrySettings {
    /// Create default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max retries.
    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the first retry delay.
    #[must_use]
    pub fn first_retry_delay(mut self, delay: Duration) -> Self {
        self.first_retry_delay = delay;
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub fn max_delay(mut self, max: Duration) -> Self {
        self.max_delay = Some(max);
        self
    }

    /// Build a policy from these settings.
    pub fn into_policy<T>(self) -> Policy<T> {
        let policy = Policy::new()
            .max_retries(self.max_retries)
            .first_retry_delay(self.first_retry_delay);
        match self.max_delay {
            Some(max) => policy.max_delay(max),
            None => policy,
        }
    }
}

impl<T> From<RetrySettings> for Policy<T> {
    fn from(settings: RetrySettings) -> Self {
        settings.into_policy()
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => d.as_secs_f64().serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_policy() {
        let policy: Policy<()> = RetrySettings::default().into();
        let defaults = Policy::<()>::new();

        assert_eq!(policy.get_max_retries(), defaults.get_max_retries());
        assert_eq!(policy.get_first_retry_delay(), defaults.get_first_retry_delay());
        assert_eq!(policy.get_max_delay(), None);
    }

    #[test]
    fn test_deserialize_partial() {
        let settings: RetrySettings =
            serde_json::from_str(r#"{"first_retry_delay": 0.25}"#).unwrap();

        assert_eq!(
            settings,
            RetrySettings::new().first_retry_delay(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_deserialize_full() {
        let settings: RetrySettings = serde_json::from_str(
            r#"{"max_retries": 4, "first_retry_delay": 0.5, "max_delay": 10}"#,
        )
        .unwrap();

        let policy = settings.into_policy::<String>();
        assert_eq!(policy.get_max_retries(), 4);
        assert_eq!(policy.get_first_retry_delay(), Duration::from_millis(500));
        assert_eq!(policy.get_max_delay(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_negative_delay_is_rejected() {
        let result = serde_json::from_str::<RetrySettings>(r#"{"first_retry_delay": -1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_delay_parses_but_fails_validation() {
        let settings: RetrySettings =
            serde_json::from_str(r#"{"first_retry_delay": 0}"#).unwrap();
        let policy: Policy<()> = settings.into();
        assert!(policy.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_serialize_skips_missing_cap() {
        let json = serde_json::to_value(RetrySettings::new().max_retries(2)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"max_retries": 2, "first_retry_delay": 1.0})
        );
    }
}
