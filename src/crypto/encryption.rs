//! # Sealing Module
//!
//! Authenticated public-key encryption of signed bundles: X25519 key
//! agreement, HKDF-SHA256 and AES-256-GCM.
//!
//! ## Seal Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           SEAL (sender)                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Step 1: Shared secret                                                 │
//! │    sender X25519 private × recipient X25519 public → dh_output         │
//! │    (rejected when not contributory, e.g. low-order recipient key)      │
//! │                                                                         │
//! │  Step 2: Sealing key                                                   │
//! │    HKDF-SHA256(dh_output, salt = sender_pub || recipient_pub)          │
//! │                                                                         │
//! │  Step 3: Encrypt                                                       │
//! │    AES-256-GCM(key, random 12-byte nonce, plaintext,                   │
//! │                aad = sender_pub || recipient_pub)                      │
//! │                                                                         │
//! │  Output:                                                               │
//! │    ┌────────────┬──────────────────────────┬───────────────┐           │
//! │    │ nonce (12) │ ciphertext (len(plain))  │ tag (16)      │           │
//! │    └────────────┴──────────────────────────┴───────────────┘           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Opening runs the same derivation from the recipient's side. Any wrong key,
//! truncated input or flipped bit surfaces as `DecryptionFailed`.
//!
//! ## Security Properties
//!
//! | Property | Guarantee |
//! |----------|-----------|
//! | Confidentiality | Only sender and recipient can read the bundle |
//! | Integrity | Any modification is detected by the GCM tag |
//! | Sender binding | Opening requires the sender's public key |
//! | Direction binding | A sealed bundle cannot be reflected back to its sender |

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::crypto::kdf::derive_seal_key;
use crate::crypto::{EncryptionKeyPair, EncryptionPublicKey, KeyPair};
use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Bytes a sealed bundle adds on top of its plaintext
pub const SEAL_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// A nonce (number used once) for AES-GCM encryption
///
/// **NEVER reuse a nonce with the same key!** Random 96-bit nonces are safe
/// for up to 2^32 messages per key.
#[derive(Clone, Copy, Debug)]
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a cryptographically random nonce
    pub fn random() -> Result<Self> {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::EncryptionFailed(format!("Nonce generation failed: {}", e)))?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// An AES-256-GCM encryption key
///
/// Zeroized when dropped.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

/// Encrypt with AES-256-GCM, returning `(nonce, ciphertext_with_tag)`
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8], aad: &[u8]) -> Result<(Nonce, Vec<u8>)> {
    let nonce = Nonce::random()?;
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;

    let payload = Payload {
        msg: plaintext,
        aad,
    };

    let ciphertext = cipher
        .encrypt(AesNonce::from_slice(&nonce.0), payload)
        .map_err(|e| Error::EncryptionFailed(format!("Encryption failed: {}", e)))?;

    Ok((nonce, ciphertext))
}

/// Decrypt AES-256-GCM ciphertext
///
/// Returns `DecryptionFailed` if the ciphertext was tampered with, the AAD
/// doesn't match, or the key or nonce is wrong.
pub fn decrypt(
    key: &EncryptionKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::DecryptionFailed(format!("Invalid key: {}", e)))?;

    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    cipher
        .decrypt(AesNonce::from_slice(&nonce.0), payload)
        .map_err(|_| {
            Error::DecryptionFailed("Decryption failed: authentication tag mismatch".into())
        })
}

/// The sealing capability consumed by the message protocol
///
/// `seal` encrypts for a recipient with the implementor's private key;
/// `open` reverses it given the claimed sender's public key.
pub trait MessageSealer {
    /// Public half of the sealing key
    fn public_key(&self) -> EncryptionPublicKey;

    /// Authenticated-encrypt `plaintext` for `recipient`
    fn seal(&self, plaintext: &[u8], recipient: &EncryptionPublicKey) -> Result<Vec<u8>>;

    /// Authenticated-decrypt `sealed`, produced by `sender` for us
    fn open(&self, sealed: &[u8], sender: &EncryptionPublicKey) -> Result<Vec<u8>>;
}

impl MessageSealer for EncryptionKeyPair {
    fn public_key(&self) -> EncryptionPublicKey {
        EncryptionKeyPair::public_key(self)
    }

    fn seal(&self, plaintext: &[u8], recipient: &EncryptionPublicKey) -> Result<Vec<u8>> {
        seal(self, recipient, plaintext)
    }

    fn open(&self, sealed: &[u8], sender: &EncryptionPublicKey) -> Result<Vec<u8>> {
        open(self, sender, sealed)
    }
}

impl MessageSealer for KeyPair {
    fn public_key(&self) -> EncryptionPublicKey {
        self.encryption.public_key()
    }

    fn seal(&self, plaintext: &[u8], recipient: &EncryptionPublicKey) -> Result<Vec<u8>> {
        seal(&self.encryption, recipient, plaintext)
    }

    fn open(&self, sealed: &[u8], sender: &EncryptionPublicKey) -> Result<Vec<u8>> {
        open(&self.encryption, sender, sealed)
    }
}

/// Seal `plaintext` from `sender` to `recipient`
///
/// Output layout is `nonce || ciphertext || tag`.
pub fn seal(
    sender: &EncryptionKeyPair,
    recipient: &EncryptionPublicKey,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let sender_public = sender.public_key();

    let shared = sender.diffie_hellman(recipient);
    if !shared.was_contributory() {
        return Err(Error::EncryptionFailed(
            "Recipient public key yields a non-contributory shared secret".into(),
        ));
    }

    let key = derive_seal_key(shared.as_bytes(), sender_public.as_bytes(), recipient.as_bytes())
        .map(EncryptionKey::from_bytes)
        .map_err(|e| Error::EncryptionFailed(e.to_string()))?;

    let aad = binding_aad(&sender_public, recipient);
    let (nonce, ciphertext) = encrypt(&key, plaintext, &aad)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(nonce.as_bytes());
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a bundle sealed by `sender` for `receiver`
pub fn open(
    receiver: &EncryptionKeyPair,
    sender: &EncryptionPublicKey,
    sealed: &[u8],
) -> Result<Vec<u8>> {
    if sealed.len() < SEAL_OVERHEAD {
        return Err(Error::DecryptionFailed(format!(
            "Sealed bundle too short: {} bytes (min {})",
            sealed.len(),
            SEAL_OVERHEAD
        )));
    }

    let receiver_public = receiver.public_key();

    let shared = receiver.diffie_hellman(sender);
    if !shared.was_contributory() {
        return Err(Error::DecryptionFailed(
            "Sender public key yields a non-contributory shared secret".into(),
        ));
    }

    let key = derive_seal_key(shared.as_bytes(), sender.as_bytes(), receiver_public.as_bytes())
        .map(EncryptionKey::from_bytes)
        .map_err(|e| Error::DecryptionFailed(e.to_string()))?;

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(nonce_bytes);

    let aad = binding_aad(sender, &receiver_public);
    decrypt(&key, &Nonce(nonce), ciphertext, &aad)
}

/// AAD binding a bundle to its sender and recipient, in that order
fn binding_aad(sender: &EncryptionPublicKey, recipient: &EncryptionPublicKey) -> [u8; 64] {
    let mut aad = [0u8; 64];
    aad[..32].copy_from_slice(sender.as_bytes());
    aad[32..].copy_from_slice(recipient.as_bytes());
    aad
}

// ============================================================================
// TESTS
// ============================================================================
