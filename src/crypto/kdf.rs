//! # Key Derivation Functions
//!
//! HKDF-SHA256 derivations for key pairs and sealing keys.
//!
//! ## Sealing Key Derivation
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  X25519(our_secret, their_public) ──► dh_output (32 bytes)             │
//! │                                            │                            │
//! │                                            ▼                            │
//! │  HKDF-SHA256(                                                          │
//! │    ikm  = dh_output,                                                   │
//! │    salt = sender_public || recipient_public,                           │
//! │    info = "securemsg-seal-v1"                                          │
//! │  ) ──► AES-256-GCM key (32 bytes)                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Salting with both public keys in sender→recipient order gives each
//! direction of a conversation its own key.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Domain separation strings for HKDF
pub mod domain {
    /// Domain for signing key derivation
    pub const SIGNING_KEY: &[u8] = b"securemsg-signing-key-v1";

    /// Domain for encryption key derivation
    pub const ENCRYPTION_KEY: &[u8] = b"securemsg-encryption-key-v1";

    /// Domain for sealing key derivation
    pub const SEAL: &[u8] = b"securemsg-seal-v1";
}

/// Keys derived from a master seed
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeys {
    /// Ed25519 signing key (32 bytes)
    pub signing_key: [u8; 32],

    /// X25519 encryption key (32 bytes)
    pub encryption_key: [u8; 32],
}

/// Derive signing and encryption keys from a master seed
///
/// The input seed should have at least 256 bits of entropy.
pub fn derive_keys_from_seed(seed: &[u8; 32]) -> Result<DerivedKeys> {
    let hkdf = Hkdf::<Sha256>::new(None, seed);

    let mut signing_key = [0u8; 32];
    hkdf.expand(domain::SIGNING_KEY, &mut signing_key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive signing key".into()))?;

    let mut encryption_key = [0u8; 32];
    hkdf.expand(domain::ENCRYPTION_KEY, &mut encryption_key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive encryption key".into()))?;

    Ok(DerivedKeys {
        signing_key,
        encryption_key,
    })
}

/// Derive the AES-256-GCM key that seals one direction of a conversation
pub fn derive_seal_key(
    dh_output: &[u8; 32],
    sender_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> Result<[u8; 32]> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(sender_public);
    salt[32..].copy_from_slice(recipient_public);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), dh_output);

    let mut key = [0u8; 32];
    hkdf.expand(domain::SEAL, &mut key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive sealing key".into()))?;

    Ok(key)
}

// ============================================================================
// TESTS
// ============================================================================
