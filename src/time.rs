//! Time sources for message timestamps.
//!
//! Envelopes carry a UTC timestamp with sub-second precision. The protocol
//! reads it through a [`Clock`] so tests can pin the current time.

use chrono::{DateTime, Utc};

/// Returns the current UTC time.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// A source of the current UTC time
pub trait Clock {
    /// The current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time via `chrono::Utc::now()`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        now_utc()
    }
}

/// A clock that always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
