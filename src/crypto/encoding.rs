//! # Public Key Encoding
//!
//! Public keys are exchanged as self-describing multibase strings.
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       PUBLIC KEY STRING FORMAT                          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   "z" ++ base58btc( multicodec (2 bytes) ++ public key (32 bytes) )    │
//! │                                                                         │
//! │   ┌──────────────┬───────────────┬──────────────────────────────┐      │
//! │   │ Key type     │ Multicodec    │ Typical string prefix        │      │
//! │   ├──────────────┼───────────────┼──────────────────────────────┤      │
//! │   │ Ed25519      │ 0xed 0x01     │ z6Mk...                      │      │
//! │   │ X25519       │ 0xec 0x01     │ z6LS...                      │      │
//! │   └──────────────┴───────────────┴──────────────────────────────┘      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The multicodec makes the two key types non-interchangeable: a signing key
//! string never decodes as an encryption key and vice versa.
//!
//! ## References
//!
//! - [Multicodec](https://github.com/multiformats/multicodec)
//! - [Multibase](https://github.com/multiformats/multibase)

use crate::error::{Error, Result};

/// Multibase prefix for base58btc
const BASE58BTC_PREFIX: char = 'z';

/// Multicodec prefix for Ed25519 public keys (0xed in varint encoding)
pub const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// Multicodec prefix for X25519 public keys (0xec in varint encoding)
pub const X25519_MULTICODEC: [u8; 2] = [0xec, 0x01];

/// Encode a 32-byte public key with the given multicodec prefix
pub fn encode_key(multicodec: [u8; 2], key: &[u8; 32]) -> String {
    let mut prefixed = Vec::with_capacity(34);
    prefixed.extend_from_slice(&multicodec);
    prefixed.extend_from_slice(key);

    format!("{}{}", BASE58BTC_PREFIX, bs58::encode(&prefixed).into_string())
}

/// Decode a multibase key string, requiring the given multicodec prefix
///
/// `label` names the expected key type in error messages.
pub fn decode_key(encoded: &str, multicodec: [u8; 2], label: &str) -> Result<[u8; 32]> {
    let body = encoded.strip_prefix(BASE58BTC_PREFIX).ok_or_else(|| {
        Error::InvalidKey(format!("{} key must start with 'z' (base58btc)", label))
    })?;

    let decoded = bs58::decode(body)
        .into_vec()
        .map_err(|e| Error::InvalidKey(format!("Invalid base58btc encoding: {}", e)))?;

    if decoded.len() != 34 {
        return Err(Error::InvalidKey(format!(
            "Invalid {} key length: expected 34 bytes (2 prefix + 32 key), got {}",
            label,
            decoded.len()
        )));
    }

    if decoded[0..2] != multicodec {
        return Err(Error::InvalidKey(format!(
            "Not an {} key: multicodec {:02x}{:02x}",
            label, decoded[0], decoded[1]
        )));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&decoded[2..]);
    Ok(key)
}

// ============================================================================
// TESTS
// ============================================================================
