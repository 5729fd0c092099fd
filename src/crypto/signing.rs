//! # Digital Signatures Module
//!
//! Ed25519 detached signatures over canonical envelope bytes.
//!
//! ## Signature Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     SIGN / VERIFY AN ENVELOPE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SENDER                                                                │
//! │  ┌──────────────────────┐     ┌──────────────────────┐                 │
//! │  │ canonical envelope   │────►│ MessageSigner::sign  │──► 64-byte sig  │
//! │  │ {"ts","nonce",...}   │     │ (Ed25519 private key)│                 │
//! │  └──────────────────────┘     └──────────────────────┘                 │
//! │                                                                         │
//! │  RECIPIENT                                                             │
//! │  ┌──────────────────────┐                                              │
//! │  │ content || signature │──┐                                           │
//! │  └──────────────────────┘  │  ┌──────────────────────┐                 │
//! │                            ├─►│ verify(public key)   │──► Ok / Err     │
//! │  SigningPublicKey ─────────┘  └──────────────────────┘                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//!
//! | Property | Description |
//! |----------|-------------|
//! | Authenticity | Verifies the envelope came from the claimed sender |
//! | Integrity | Detects any modification to the signed bytes |
//! | Non-repudiation | Sender cannot deny having signed the envelope |
//! | Deterministic | Same key and bytes always give the same signature |

use ed25519_dalek::{Signature as Ed25519Signature, Signer, Verifier};
use serde::{Deserialize, Serialize};

use crate::crypto::{KeyPair, SigningKeyPair, SigningPublicKey};
use crate::error::{Error, Result};

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// An Ed25519 digital signature
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "signature_bytes")] pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (must be exactly 64 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; SIGNATURE_SIZE] = slice.try_into().map_err(|_| {
            Error::MalformedMessage(format!(
                "Signature must be {} bytes, got {}",
                SIGNATURE_SIZE,
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// Encode as hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from hex string
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| Error::DecodingFailed(format!("Invalid signature hex: {}", e)))?;
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// The signing capability consumed by the message protocol
///
/// Implementations sign an arbitrary byte buffer and return a detached
/// signature. Failures are reported as [`Error::SigningFailed`].
pub trait MessageSigner {
    /// Public half of the signing key, as recipients will resolve it
    fn public_key(&self) -> SigningPublicKey;

    /// Produce a detached signature over `message`
    fn sign(&self, message: &[u8]) -> Result<Signature>;
}

impl MessageSigner for SigningKeyPair {
    fn public_key(&self) -> SigningPublicKey {
        SigningKeyPair::public_key(self)
    }

    fn sign(&self, message: &[u8]) -> Result<Signature> {
        self.signing_key()
            .try_sign(message)
            .map(|sig| Signature(sig.to_bytes()))
            .map_err(|e| Error::SigningFailed(e.to_string()))
    }
}

impl MessageSigner for KeyPair {
    fn public_key(&self) -> SigningPublicKey {
        self.signing.public_key()
    }

    fn sign(&self, message: &[u8]) -> Result<Signature> {
        MessageSigner::sign(&self.signing, message)
    }
}

/// Sign a message with any signing capability
///
/// ## Example
///
/// ```ignore
/// let keypair = SigningKeyPair::generate();
/// let signature = sign(&keypair, b"Hello, World!")?;
/// ```
pub fn sign<S: MessageSigner + ?Sized>(signer: &S, message: &[u8]) -> Result<Signature> {
    signer.sign(message)
}

/// Verify an Ed25519 signature
///
/// Returns `Ok(())` if valid, `Err(VerificationFailed)` if the signature
/// does not match `message` under `public_key`.
///
/// ## Example
///
/// ```ignore
/// verify(&keypair.public_key(), b"Hello, World!", &signature)?;
/// ```
pub fn verify(public_key: &SigningPublicKey, message: &[u8], signature: &Signature) -> Result<()> {
    let verifying_key = public_key.verifying_key()?;
    let sig = Ed25519Signature::from_bytes(&signature.0);

    verifying_key
        .verify(message, &sig)
        .map_err(|_| Error::VerificationFailed)
}

/// Serde helper for signature bytes
mod signature_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 64], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid signature length"))
    }
}

// ============================================================================
// TESTS
// ============================================================================
