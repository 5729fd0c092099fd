//! # Error Handling
//!
//! This module provides the error type shared by every securemsg operation.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Envelope Errors                                                   │
//! │  │   ├── EncodingFailed        - Canonical encoding failed             │
//! │  │   └── DecodingFailed        - Bytes are not a valid envelope        │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── SigningFailed         - Signature could not be produced       │
//! │  │   ├── VerificationFailed    - Signature does not match              │
//! │  │   ├── EncryptionFailed      - Sealing failed                        │
//! │  │   ├── DecryptionFailed      - Opening failed (keys / tampering)     │
//! │  │   ├── InvalidKey            - Public key string/bytes malformed     │
//! │  │   └── KeyDerivationFailed   - HKDF expansion failed                 │
//! │  │                                                                      │
//! │  └── Message Errors                                                    │
//! │      ├── MalformedMessage      - Plaintext too short for a signature   │
//! │      ├── MessageTooLarge       - Size limit exceeded                   │
//! │      ├── StaleMessage          - Outside the freshness window          │
//! │      └── ReplayDetected        - Nonce already accepted                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error is terminal for the operation that produced it. Nothing in
//! this crate retries; retry policy belongs to the transport layer.

use thiserror::Error;

/// Result type alias for securemsg operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for securemsg
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Envelope Errors (100-199)
    // ========================================================================

    /// The envelope could not be canonical-encoded
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// The bytes are not a well-formed envelope for the expected payload type
    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    // ========================================================================
    // Crypto Errors (200-299)
    // ========================================================================

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Signature verification failed
    #[error("Signature verification failed")]
    VerificationFailed,

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Invalid key format or length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    // ========================================================================
    // Message Errors (300-399)
    // ========================================================================

    /// Decrypted plaintext cannot hold a signature
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Message exceeds the configured size limit
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Observed size in bytes
        size: usize,
        /// Configured limit in bytes
        max: usize,
    },

    /// Message timestamp is outside the accepted window
    #[error("Stale message: {0}")]
    StaleMessage(String),

    /// Message nonce has already been accepted
    #[error("Replay detected: {0}")]
    ReplayDetected(String),
}

impl Error {
    /// Get a stable numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Envelope
    /// - 200-299: Crypto
    /// - 300-399: Message
    pub fn code(&self) -> i32 {
        match self {
            // Envelope (100-199)
            Error::EncodingFailed(_) => 100,
            Error::DecodingFailed(_) => 101,

            // Crypto (200-299)
            Error::SigningFailed(_) => 200,
            Error::VerificationFailed => 201,
            Error::EncryptionFailed(_) => 202,
            Error::DecryptionFailed(_) => 203,
            Error::InvalidKey(_) => 204,
            Error::KeyDerivationFailed(_) => 205,

            // Message (300-399)
            Error::MalformedMessage(_) => 300,
            Error::MessageTooLarge { .. } => 301,
            Error::StaleMessage(_) => 302,
            Error::ReplayDetected(_) => 303,
        }
    }

    /// Check if this error means the received bytes were not authentic
    ///
    /// These are the failures worth auditing: a ciphertext that does not
    /// open, a plaintext too short to carry a signature, a signature that
    /// does not verify, or a replayed nonce.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Error::DecryptionFailed(_)
                | Error::MalformedMessage(_)
                | Error::VerificationFailed
                | Error::ReplayDetected(_)
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
