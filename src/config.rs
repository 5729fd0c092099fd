//! Protocol configuration.
//!
//! Defaults accept everything the core protocol accepts: the freshness window
//! is off and the size limit is generous. Applications tighten it for their
//! transport.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default maximum canonical envelope size (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default tolerated clock skew for timestamps in the future (30 seconds)
pub const DEFAULT_MAX_CLOCK_SKEW_SECS: i64 = 30;

/// Configuration for [`MessageProtocol`](crate::message::MessageProtocol)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Largest canonical envelope accepted on either path, in bytes
    pub max_message_size: usize,
    /// Oldest message accepted on receive; `None` disables the check
    #[serde(with = "optional_seconds")]
    pub max_message_age: Option<Duration>,
    /// How far in the future a timestamp may be when the window is enabled
    #[serde(with = "seconds")]
    pub max_clock_skew: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_message_age: None,
            max_clock_skew: Duration::seconds(DEFAULT_MAX_CLOCK_SKEW_SECS),
        }
    }
}

impl ProtocolConfig {
    /// Set the size limit
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Enable the freshness window
    pub fn with_max_message_age(mut self, age: Duration) -> Self {
        self.max_message_age = Some(age);
        self
    }

    /// Set the tolerated future skew
    pub fn with_max_clock_skew(mut self, skew: Duration) -> Self {
        self.max_clock_skew = skew;
        self
    }

    /// Fail with `MessageTooLarge` when `size` exceeds the limit
    pub fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            return Err(Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        Ok(())
    }

    /// Fail with `StaleMessage` when `timestamp` is outside the window at `now`
    ///
    /// A no-op while `max_message_age` is `None`.
    pub fn check_freshness(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        let Some(max_age) = self.max_message_age else {
            return Ok(());
        };

        // No upper bound when the skew reaches past the latest representable time
        if let Some(latest) = now.checked_add_signed(self.max_clock_skew) {
            if timestamp > latest {
                return Err(Error::StaleMessage(format!(
                    "timestamp {} is ahead of local time {}",
                    timestamp, now
                )));
            }
        }

        if now - timestamp > max_age {
            return Err(Error::StaleMessage(format!(
                "timestamp {} is older than {}s",
                timestamp,
                max_age.num_seconds()
            )));
        }

        Ok(())
    }
}

/// Serde helper for durations as whole seconds
mod seconds {
    use chrono::Duration;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(d)?;
        from_secs(secs).map_err(D::Error::custom)
    }

    pub(super) fn from_secs(secs: i64) -> Result<Duration, String> {
        Duration::try_seconds(secs)
            .ok_or_else(|| format!("duration of {} seconds is out of range", secs))
    }
}

/// Serde helper for optional durations as whole seconds
mod optional_seconds {
    use chrono::Duration;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.num_seconds()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<i64>::deserialize(d)?
            .map(super::seconds::from_secs)
            .transpose()
            .map_err(D::Error::custom)
    }
}
