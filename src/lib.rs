//! # securemsg
//!
//! Signed, sealed message envelopes for arbitrary serde payloads.
//!
//! A payload is bound to a timestamp and a random nonce, signed with the
//! sender's Ed25519 key, and the signed bundle is sealed for one recipient
//! with X25519 + AES-256-GCM. The recipient opens, verifies and only then
//! decodes.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECUREMSG MODULES                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │                          Message                                  │ │
//! │  │  SecureMessage<T> · MessageProtocol · ReplayGuard                 │ │
//! │  │  sign ─► encrypt            decrypt ─► open ─► verify ─► decode   │ │
//! │  └─────────┬─────────────────────────────────────┬───────────────────┘ │
//! │            │                                     │                     │
//! │  ┌─────────▼─────────┐  ┌────────────────────────▼──────────────────┐  │
//! │  │     Envelope      │  │                 Crypto                    │  │
//! │  │                   │  │                                           │  │
//! │  │ - ts / nonce /    │  │ - Ed25519 signing (MessageSigner)         │  │
//! │  │   payload         │  │ - X25519 + HKDF + AES-GCM (MessageSealer) │  │
//! │  │ - canonical JSON  │  │ - Multibase public keys                   │  │
//! │  └───────────────────┘  └───────────────────────────────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐                     │
//! │  │   Config    │  │    Time     │  │    Error    │                     │
//! │  └─────────────┘  └─────────────┘  └─────────────┘                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error type for the entire library
//! - [`crypto`] - Key pairs, signing and sealing capabilities
//! - [`envelope`] - Canonical `(timestamp, nonce, payload)` encoding
//! - [`message`] - The sign-then-encrypt protocol
//! - [`config`] - Size limits and freshness window
//! - [`time`] - Injectable clocks
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Layer 1: Authentication (Ed25519 over the canonical envelope)         │
//! │  ─────────────────────────────────────────────────────────             │
//! │  Only the holder of the sender's signing key can produce a bundle      │
//! │  that verifies. The timestamp and nonce are covered by the signature.  │
//! │                                                                         │
//! │  Layer 2: Confidentiality (X25519 + HKDF-SHA256 + AES-256-GCM)         │
//! │  ─────────────────────────────────────────────────────────────         │
//! │  The signed bundle is sealed for one recipient. Both parties' keys     │
//! │  are bound into the derived key and the AEAD associated data.          │
//! │                                                                         │
//! │  Layer 3: Freshness (optional)                                         │
//! │  ─────────────────────────────                                         │
//! │  A receive-side age window and a replay guard keyed by nonce.          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use securemsg::{KeyPair, SecureMessage};
//!
//! let alice = KeyPair::generate();
//! let bob = KeyPair::generate();
//!
//! let mut msg = SecureMessage::sign("Hello Bob".to_string(), &alice)?;
//! msg.encrypt(&alice, &bob.public_keys().encryption.encode())?;
//!
//! let mut received = SecureMessage::<String>::from_encrypted(msg.encrypted().unwrap().to_vec());
//! received.decrypt(
//!     &bob,
//!     &alice.public_keys().encryption.encode(),
//!     &alice.public_keys().signing.encode(),
//! )?;
//! assert_eq!(received.payload().unwrap(), "Hello Bob");
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod message;
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::ProtocolConfig;
pub use crypto::{
    EncryptionKeyPair, EncryptionPublicKey, KeyPair, MessageSealer, MessageSigner, PublicKeys,
    Signature, SigningKeyPair, SigningPublicKey,
};
pub use envelope::{Envelope, MessageNonce};
pub use error::{Error, Result};
pub use message::{MessageProtocol, MessageStage, ReplayGuard, SecureMessage};

// ============================================================================
// TESTS
// ============================================================================
