//! # Envelope Module
//!
//! The `(timestamp, nonce, payload)` triple that signatures are computed over.
//!
//! ## Canonical Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CANONICAL ENVELOPE                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  {"ts":"2026-10-19T08:15:30.123456789Z",                               │
//! │   "nonce":"9f86d081884c7d659a2feaa0c55ad015",                          │
//! │   "payload":{ ...T... }}                                               │
//! │                                                                         │
//! │  • Compact JSON, fields always in this order                           │
//! │  • ts: RFC 3339, UTC, sub-second precision                             │
//! │  • nonce: 16 random bytes as 32 lowercase hex characters               │
//! │  • payload: T's own serde representation                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod codec;
mod finite;

pub use codec::{decode, encode};

use std::fmt;

use chrono::{DateTime, Utc};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Size of an envelope nonce in bytes (128 bits)
pub const NONCE_SIZE: usize = 16;

/// Length of a hex-encoded envelope nonce
pub const NONCE_HEX_LEN: usize = NONCE_SIZE * 2;

/// A 128-bit per-message nonce
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageNonce([u8; NONCE_SIZE]);

impl MessageNonce {
    /// Draw a fresh nonce from a cryptographically secure generator
    ///
    /// Fails rather than falling back when the generator cannot deliver.
    pub fn generate<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Result<Self> {
        let mut bytes = [0u8; NONCE_SIZE];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|e| Error::SigningFailed(format!("Nonce generation failed: {}", e)))?;
        Ok(Self(bytes))
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// Encode as a 32-character lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from a 32-character hex string
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != NONCE_HEX_LEN {
            return Err(Error::DecodingFailed(format!(
                "Nonce must be {} hex characters, got {}",
                NONCE_HEX_LEN,
                hex_str.len()
            )));
        }

        let mut bytes = [0u8; NONCE_SIZE];
        hex::decode_to_slice(hex_str, &mut bytes)
            .map_err(|e| Error::DecodingFailed(format!("Invalid nonce hex: {}", e)))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for MessageNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for MessageNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageNonce({})", self.to_hex())
    }
}

impl Serialize for MessageNonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MessageNonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A decoded envelope
///
/// Transient: built while signing or verifying, never transmitted on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    /// When the envelope was created (UTC)
    pub timestamp: DateTime<Utc>,
    /// Per-message random nonce
    pub nonce: MessageNonce,
    /// Caller payload
    pub payload: T,
}

impl<T: Serialize> Envelope<T> {
    /// Canonical bytes of this envelope
    pub fn to_canonical(&self) -> Result<Vec<u8>> {
        encode(&self.timestamp, &self.nonce, &self.payload)
    }
}

// ============================================================================
// TESTS
// ============================================================================
