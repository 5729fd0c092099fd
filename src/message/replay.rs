//! In-memory replay detection.
//!
//! A signature proves who wrote an envelope, not that it is being delivered
//! for the first time. `ReplayGuard` remembers accepted nonces for a
//! retention window and rejects repeats. State is process-local; sharing it
//! across nodes or restarts is up to the application.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::envelope::MessageNonce;
use crate::error::{Error, Result};

/// Records nonces of accepted messages
///
/// Share one guard between protocol instances with `Arc<ReplayGuard>`.
#[derive(Debug)]
pub struct ReplayGuard {
    retention: Duration,
    seen: Mutex<HashMap<MessageNonce, DateTime<Utc>>>,
}

impl ReplayGuard {
    /// Create a guard that remembers nonces for `retention`
    ///
    /// Messages timestamped more than `retention` before the current time
    /// are refused, so the guard also acts as a coarse freshness window.
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record `nonce`, failing with `ReplayDetected` if it was already seen
    ///
    /// Messages timestamped before the retention window are rejected too:
    /// their record would be pruned straight away, so a repeat could not be
    /// told apart from a first delivery.
    pub fn check_and_record(
        &self,
        nonce: &MessageNonce,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut seen = self.seen.lock();

        // None when the window reaches past the earliest representable time
        if let Some(cutoff) = now.checked_sub_signed(self.retention) {
            seen.retain(|_, ts| *ts >= cutoff);

            if timestamp < cutoff {
                return Err(Error::ReplayDetected(format!(
                    "nonce {} is older than the {}s replay window",
                    nonce,
                    self.retention.num_seconds()
                )));
            }
        }

        if seen.contains_key(nonce) {
            return Err(Error::ReplayDetected(format!("nonce {} already accepted", nonce)));
        }

        seen.insert(*nonce, timestamp);
        Ok(())
    }

    /// Number of nonces currently remembered
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Whether no nonces are remembered
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}
