//! # Key Management
//!
//! Key pairs and typed public keys used by the message protocol.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SigningKeyPair (Ed25519)          → SigningPublicKey           │   │
//! │  │  ─────────────────────────                                       │   │
//! │  │  • Signs canonical envelopes                                    │   │
//! │  │  • Public form: "z6Mk..." (multicodec 0xed01)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  EncryptionKeyPair (X25519)        → EncryptionPublicKey        │   │
//! │  │  ─────────────────────────────                                   │   │
//! │  │  • Seals / opens signed bundles                                 │   │
//! │  │  • Public form: "z6LS..." (multicodec 0xec01)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  KeyPair (Combined)                → PublicKeys                 │   │
//! │  │  ────────────────────                                            │   │
//! │  │  Both of the above, derivable from one 32-byte seed.            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use x25519_dalek::{PublicKey as X25519PublicKey, SharedSecret as X25519SharedSecret, StaticSecret};
use zeroize::ZeroizeOnDrop;

use super::encoding::{decode_key, encode_key, ED25519_MULTICODEC, X25519_MULTICODEC};
use crate::error::{Error, Result};

/// Combined keypair containing both signing and encryption keys
///
/// ## Security
///
/// - Private keys are zeroized when this struct is dropped
/// - Public keys can be safely shared with anyone
#[derive(ZeroizeOnDrop)]
pub struct KeyPair {
    /// Ed25519 keypair for signing
    pub signing: SigningKeyPair,
    /// X25519 keypair for sealing
    pub encryption: EncryptionKeyPair,
}

impl KeyPair {
    /// Generate a new random keypair from the OS random number generator
    pub fn generate() -> Self {
        Self {
            signing: SigningKeyPair::generate(),
            encryption: EncryptionKeyPair::generate(),
        }
    }

    /// Create a keypair from a 32-byte seed
    ///
    /// This is deterministic: the same seed always produces the same keys.
    ///
    /// ```text
    /// Seed (32 bytes)
    ///       │
    ///       ├──► HKDF(info="securemsg-signing-key-v1")    → Signing Key
    ///       │
    ///       └──► HKDF(info="securemsg-encryption-key-v1") → Encryption Key
    /// ```
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self> {
        use crate::crypto::kdf::derive_keys_from_seed;

        let derived = derive_keys_from_seed(seed)?;

        Ok(Self {
            signing: SigningKeyPair::from_bytes(&derived.signing_key),
            encryption: EncryptionKeyPair::from_bytes(&derived.encryption_key),
        })
    }

    /// Get the public keys for sharing with others
    pub fn public_keys(&self) -> PublicKeys {
        PublicKeys {
            signing: self.signing.public_key(),
            encryption: self.encryption.public_key(),
        }
    }
}

/// Ed25519 signing keypair
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    /// Private signing key (secret)
    #[zeroize(skip)] // ed25519_dalek::SigningKey handles its own zeroization
    secret: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random signing keypair
    pub fn generate() -> Self {
        let secret = SigningKey::generate(&mut OsRng);
        Self { secret }
    }

    /// Create from raw secret bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = SigningKey::from_bytes(bytes);
        Self { secret }
    }

    /// Get the secret key bytes (for backup/storage)
    ///
    /// ## Security Warning
    ///
    /// Only use this for secure storage. Never log or transmit these bytes.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the public key
    pub fn public_key(&self) -> SigningPublicKey {
        SigningPublicKey {
            bytes: self.secret.verifying_key().to_bytes(),
        }
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.secret
    }
}

/// X25519 encryption keypair
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKeyPair {
    /// Private encryption key (secret)
    #[zeroize(skip)] // x25519_dalek handles its own zeroization
    secret: StaticSecret,
    /// Public encryption key (derived from secret)
    #[zeroize(skip)]
    public: X25519PublicKey,
}

impl EncryptionKeyPair {
    /// Generate a new random encryption keypair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Create from raw secret bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the secret key bytes (for backup/storage)
    ///
    /// ## Security Warning
    ///
    /// Only use this for secure storage. Never log or transmit these bytes.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the public key
    pub fn public_key(&self) -> EncryptionPublicKey {
        EncryptionPublicKey {
            bytes: self.public.to_bytes(),
        }
    }

    /// Perform Diffie-Hellman key exchange
    ///
    /// Both `alice_secret × bob_public` and `bob_secret × alice_public`
    /// produce the same shared secret.
    pub(crate) fn diffie_hellman(&self, their_public: &EncryptionPublicKey) -> X25519SharedSecret {
        let their_public = X25519PublicKey::from(their_public.bytes);
        self.secret.diffie_hellman(&their_public)
    }
}

// ============================================================================
// PUBLIC KEYS
// ============================================================================

/// An Ed25519 public key used to verify envelope signatures
///
/// Always a valid curve point: construction goes through
/// [`SigningPublicKey::from_bytes`] or string parsing, both of which
/// validate the key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigningPublicKey {
    bytes: [u8; 32],
}

impl SigningPublicKey {
    /// Create from raw bytes, validating the Ed25519 point
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| Error::InvalidKey(format!("Invalid signing public key: {}", e)))?;
        Ok(Self { bytes })
    }

    /// Parse the multibase string form (`z6Mk...`)
    pub fn parse(encoded: &str) -> Result<Self> {
        let bytes = decode_key(encoded, ED25519_MULTICODEC, "Ed25519")?;
        Self::from_bytes(bytes)
    }

    /// Encode as a multibase string
    pub fn encode(&self) -> String {
        encode_key(ED25519_MULTICODEC, &self.bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Get the verifying key for signature verification
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.bytes)
            .map_err(|e| Error::InvalidKey(format!("Invalid signing public key: {}", e)))
    }
}

/// An X25519 public key used to seal messages for its owner
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncryptionPublicKey {
    bytes: [u8; 32],
}

impl EncryptionPublicKey {
    /// Create from raw bytes
    ///
    /// X25519 accepts any 32 bytes as a point; degenerate keys are caught
    /// when sealing (the shared secret would not be contributory).
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Parse the multibase string form (`z6LS...`)
    pub fn parse(encoded: &str) -> Result<Self> {
        decode_key(encoded, X25519_MULTICODEC, "X25519").map(Self::from_bytes)
    }

    /// Encode as a multibase string
    pub fn encode(&self) -> String {
        encode_key(X25519_MULTICODEC, &self.bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

macro_rules! impl_key_string_traits {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.encode())
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($ty), self.encode())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.encode())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_key_string_traits!(SigningPublicKey);
impl_key_string_traits!(EncryptionPublicKey);

/// Public keys that can be safely shared with others
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicKeys {
    /// Ed25519 public key for signature verification
    pub signing: SigningPublicKey,
    /// X25519 public key for sealing
    pub encryption: EncryptionPublicKey,
}

// ============================================================================
// TESTS
// ============================================================================
