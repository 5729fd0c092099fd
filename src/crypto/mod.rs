//! # Cryptography Module
//!
//! The signing and sealing capabilities the message protocol is built on.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC CAPABILITIES                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────────────┐   ┌──────────────────────────────┐   │
//! │  │  MessageSigner               │   │  MessageSealer               │   │
//! │  │  ─────────────               │   │  ─────────────               │   │
//! │  │  sign(bytes) → Signature     │   │  seal(bytes, recipient)      │   │
//! │  │                              │   │  open(bytes, sender)         │   │
//! │  │  Ed25519 (SigningKeyPair)    │   │  X25519 + HKDF + AES-GCM     │   │
//! │  │                              │   │  (EncryptionKeyPair)         │   │
//! │  └──────────────────────────────┘   └──────────────────────────────┘   │
//! │                                                                         │
//! │  verify(SigningPublicKey, bytes, Signature) → Ok / VerificationFailed  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose | Why Chosen |
//! |-----------|---------|------------|
//! | Ed25519 | Signing | Fast, small keys, 64-byte signatures |
//! | X25519 | Key Agreement | Fast ECDH, same curve family as Ed25519 |
//! | AES-256-GCM | Sealing | AEAD, hardware acceleration |
//! | HKDF-SHA256 | Key Derivation | Standard extract-and-expand KDF |
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: All secret keys are zeroized when dropped
//! 2. **Constant-Time Operations**: Using dalek for constant-time crypto
//! 3. **Secure Random**: Using `rand::rngs::OsRng` for key and nonce generation
//! 4. **Typed Keys**: Signing and encryption public keys never convert into
//!    each other

mod encoding;
mod encryption;
mod kdf;
mod keys;
mod signing;

pub use encoding::{ED25519_MULTICODEC, X25519_MULTICODEC};
pub use encryption::{open, seal, MessageSealer, NONCE_SIZE, SEAL_OVERHEAD, TAG_SIZE};
pub use kdf::{derive_keys_from_seed, DerivedKeys};
pub use keys::{
    EncryptionKeyPair, EncryptionPublicKey, KeyPair, PublicKeys, SigningKeyPair, SigningPublicKey,
};
pub use signing::{sign, verify, MessageSigner, Signature, SIGNATURE_SIZE};

