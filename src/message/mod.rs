//! # Message Module
//!
//! Sign-then-encrypt on the way out, decrypt-then-verify on the way in.
//!
//! ## Message Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SECURE MESSAGE LIFECYCLE                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SEND                                                                  │
//! │  ────                                                                  │
//! │  payload ──► Sign ──► Signed ──► Encrypt ──► Sealed ──► encrypted bytes│
//! │               │                    │                                    │
//! │               │ 16-byte nonce      │ re-encode envelope                │
//! │               │ UTC timestamp      │ append 64-byte signature          │
//! │               │ Ed25519 signature  │ seal for recipient                │
//! │                                                                         │
//! │  RECEIVE                                                               │
//! │  ───────                                                               │
//! │  encrypted bytes ──► Received ──► Decrypt ──► Verified ──► payload     │
//! │                                     │                                   │
//! │                                     │ open (sender enc key)            │
//! │                                     │ split content / signature        │
//! │                                     │ verify (sender sig key)          │
//! │                                     │ decode envelope                  │
//! │                                     │ freshness + replay (optional)    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//!
//! Only the sealed buffer crosses a boundary:
//!
//! ```text
//! seal_nonce(12) || AES-GCM( canonical_envelope || signature(64) ) || tag(16)
//! ```
//!
//! ## Security
//!
//! - The signature covers the canonical envelope, never the ciphertext
//! - Sealing binds both parties' encryption keys, so a sealed buffer cannot
//!   be re-attributed to a different sender
//! - The payload is decoded only after the signature has been verified
//! - Any failure leaves the message in its previous state; discard it

mod receive;
mod replay;

pub use replay::ReplayGuard;

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ProtocolConfig;
use crate::crypto::{
    EncryptionPublicKey, MessageSealer, MessageSigner, Signature, SigningPublicKey,
    SEAL_OVERHEAD, SIGNATURE_SIZE,
};
use crate::envelope::{self, Envelope, MessageNonce};
use crate::error::{Error, Result};
use crate::time::{Clock, SystemClock};

use receive::OpenedMessage;

// ============================================================================
// MESSAGE STATE
// ============================================================================

/// Where a message is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStage {
    /// Nothing populated
    Empty,
    /// Envelope and signature present, not yet sealed
    Signed,
    /// Signed and sealed for a recipient
    Sealed,
    /// Ciphertext received, not yet opened
    Received,
    /// Opened, verified and decoded
    Verified,
}

#[derive(Debug)]
enum MessageState<T> {
    Empty,
    Signed {
        envelope: Envelope<T>,
        signature: Signature,
    },
    Sealed {
        envelope: Envelope<T>,
        signature: Signature,
        encrypted: Vec<u8>,
    },
    Received {
        encrypted: Vec<u8>,
    },
    Verified {
        envelope: Envelope<T>,
        signature: Signature,
        encrypted: Vec<u8>,
    },
}

impl<T> Default for MessageState<T> {
    fn default() -> Self {
        MessageState::Empty
    }
}

impl<T> MessageState<T> {
    fn envelope(&self) -> Option<&Envelope<T>> {
        match self {
            MessageState::Signed { envelope, .. }
            | MessageState::Sealed { envelope, .. }
            | MessageState::Verified { envelope, .. } => Some(envelope),
            MessageState::Empty | MessageState::Received { .. } => None,
        }
    }

    fn signature(&self) -> Option<&Signature> {
        match self {
            MessageState::Signed { signature, .. }
            | MessageState::Sealed { signature, .. }
            | MessageState::Verified { signature, .. } => Some(signature),
            MessageState::Empty | MessageState::Received { .. } => None,
        }
    }

    fn encrypted(&self) -> Option<&[u8]> {
        match self {
            MessageState::Sealed { encrypted, .. }
            | MessageState::Received { encrypted }
            | MessageState::Verified { encrypted, .. } => Some(encrypted),
            MessageState::Empty | MessageState::Signed { .. } => None,
        }
    }

    fn into_encrypted(self) -> Option<Vec<u8>> {
        match self {
            MessageState::Sealed { encrypted, .. }
            | MessageState::Received { encrypted }
            | MessageState::Verified { encrypted, .. } => Some(encrypted),
            MessageState::Empty | MessageState::Signed { .. } => None,
        }
    }
}

// ============================================================================
// SECURE MESSAGE
// ============================================================================

/// A payload travelling through sign-then-encrypt / decrypt-then-verify
///
/// ## Example
///
/// ```ignore
/// // Alice
/// let mut msg = SecureMessage::sign(chat, &alice)?;
/// msg.encrypt(&alice, &bob_encryption_key)?;
/// let wire = msg.encrypted().unwrap().to_vec();
///
/// // Bob
/// let mut received = SecureMessage::<Chat>::from_encrypted(wire);
/// received.decrypt(&bob, &alice_encryption_key, &alice_signing_key)?;
/// let chat = received.into_payload().unwrap();
/// ```
#[derive(Debug)]
pub struct SecureMessage<T> {
    state: MessageState<T>,
}

impl<T> Default for SecureMessage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SecureMessage<T> {
    /// An empty message
    pub fn new() -> Self {
        Self {
            state: MessageState::Empty,
        }
    }

    /// Wrap ciphertext received from a peer
    pub fn from_encrypted(encrypted: Vec<u8>) -> Self {
        Self {
            state: MessageState::Received { encrypted },
        }
    }

    /// Wrap base64-armored ciphertext received from a peer
    pub fn from_base64(armored: &str) -> Result<Self> {
        let encrypted = STANDARD
            .decode(armored.trim())
            .map_err(|e| Error::DecodingFailed(format!("Invalid base64 ciphertext: {}", e)))?;
        Ok(Self::from_encrypted(encrypted))
    }

    /// Ciphertext as standard base64, once the message holds one
    pub fn to_base64(&self) -> Option<String> {
        self.encrypted().map(|bytes| STANDARD.encode(bytes))
    }

    /// Current lifecycle stage
    pub fn stage(&self) -> MessageStage {
        match self.state {
            MessageState::Empty => MessageStage::Empty,
            MessageState::Signed { .. } => MessageStage::Signed,
            MessageState::Sealed { .. } => MessageStage::Sealed,
            MessageState::Received { .. } => MessageStage::Received,
            MessageState::Verified { .. } => MessageStage::Verified,
        }
    }

    /// Whether the message was decrypted and its signature verified
    pub fn is_verified(&self) -> bool {
        matches!(self.state, MessageState::Verified { .. })
    }

    /// The payload, after Sign or a successful Decrypt
    pub fn payload(&self) -> Option<&T> {
        self.state.envelope().map(|e| &e.payload)
    }

    /// The envelope nonce, after Sign or a successful Decrypt
    pub fn nonce(&self) -> Option<&MessageNonce> {
        self.state.envelope().map(|e| &e.nonce)
    }

    /// The envelope timestamp, after Sign or a successful Decrypt
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.state.envelope().map(|e| e.timestamp)
    }

    /// The detached signature, after Sign or a successful Decrypt
    pub fn signature(&self) -> Option<&Signature> {
        self.state.signature()
    }

    /// The sealed bytes, after Encrypt or when built from received ciphertext
    pub fn encrypted(&self) -> Option<&[u8]> {
        self.state.encrypted()
    }

    /// Consume the message, returning the payload if present
    pub fn into_payload(self) -> Option<T> {
        match self.state {
            MessageState::Signed { envelope, .. }
            | MessageState::Sealed { envelope, .. }
            | MessageState::Verified { envelope, .. } => Some(envelope.payload),
            MessageState::Empty | MessageState::Received { .. } => None,
        }
    }
}

impl<T: Serialize> SecureMessage<T> {
    /// Sign `payload` with a fresh nonce and the current time
    ///
    /// Uses `OsRng`, the system clock and default limits. Use
    /// [`MessageProtocol`] to supply your own.
    pub fn sign<S: MessageSigner + ?Sized>(payload: T, signer: &S) -> Result<Self> {
        MessageProtocol::default().sign(payload, signer)
    }

    /// Seal the signed message for the holder of `recipient_public`
    ///
    /// `recipient_public` is an encoded X25519 public key (`z6LS...`). A
    /// malformed key is reported as `EncryptionFailed`.
    pub fn encrypt<K: MessageSealer + ?Sized>(
        &mut self,
        sender: &K,
        recipient_public: &str,
    ) -> Result<()> {
        let recipient = EncryptionPublicKey::parse(recipient_public)
            .map_err(|e| Error::EncryptionFailed(format!("Invalid recipient key: {}", e)))?;
        MessageProtocol::default().encrypt(self, sender, &recipient)
    }

    /// Seal the signed message for `recipient`
    pub fn encrypt_for<K: MessageSealer + ?Sized>(
        &mut self,
        sender: &K,
        recipient: &EncryptionPublicKey,
    ) -> Result<()> {
        MessageProtocol::default().encrypt(self, sender, recipient)
    }
}

impl<T: DeserializeOwned> SecureMessage<T> {
    /// Open, verify and decode the ciphertext
    ///
    /// `sender_encryption_public` (`z6LS...`) and `sender_signing_public`
    /// (`z6Mk...`) identify the claimed sender. Malformed key strings are
    /// reported as `InvalidKey`.
    pub fn decrypt<K: MessageSealer + ?Sized>(
        &mut self,
        receiver: &K,
        sender_encryption_public: &str,
        sender_signing_public: &str,
    ) -> Result<()> {
        MessageProtocol::default().decrypt_encoded(
            self,
            receiver,
            sender_encryption_public,
            sender_signing_public,
        )
    }
}

// ============================================================================
// PROTOCOL
// ============================================================================

/// Drives messages through the protocol with an injected RNG, clock and limits
///
/// ## Example
///
/// ```ignore
/// let guard = Arc::new(ReplayGuard::new(Duration::minutes(10)));
/// let protocol = MessageProtocol::new(
///     ProtocolConfig::default().with_max_message_age(Duration::minutes(5)),
/// )
/// .with_replay_guard(guard);
///
/// protocol.decrypt(&mut msg, &bob, &alice_enc, &alice_sig)?;
/// ```
pub struct MessageProtocol<R = OsRng, C = SystemClock> {
    config: ProtocolConfig,
    rng: R,
    clock: C,
    replay_guard: Option<Arc<ReplayGuard>>,
}

impl Default for MessageProtocol {
    fn default() -> Self {
        Self::new(ProtocolConfig::default())
    }
}

impl MessageProtocol {
    /// Protocol using `OsRng` and the system clock
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            rng: OsRng,
            clock: SystemClock,
            replay_guard: None,
        }
    }
}

impl<R, C> MessageProtocol<R, C> {
    /// Replace the nonce generator
    pub fn with_rng<R2: RngCore + CryptoRng>(self, rng: R2) -> MessageProtocol<R2, C> {
        MessageProtocol {
            config: self.config,
            rng,
            clock: self.clock,
            replay_guard: self.replay_guard,
        }
    }

    /// Replace the clock
    pub fn with_clock<C2: Clock>(self, clock: C2) -> MessageProtocol<R, C2> {
        MessageProtocol {
            config: self.config,
            rng: self.rng,
            clock,
            replay_guard: self.replay_guard,
        }
    }

    /// Reject nonces already accepted by `guard`
    pub fn with_replay_guard(mut self, guard: Arc<ReplayGuard>) -> Self {
        self.replay_guard = Some(guard);
        self
    }

    /// The active configuration
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }
}

impl<R: RngCore + CryptoRng, C: Clock> MessageProtocol<R, C> {
    /// Bind `payload` to a fresh nonce and timestamp and sign it
    pub fn sign<T, S>(&mut self, payload: T, signer: &S) -> Result<SecureMessage<T>>
    where
        T: Serialize,
        S: MessageSigner + ?Sized,
    {
        let nonce = MessageNonce::generate(&mut self.rng)?;
        let timestamp = self.clock.now();

        let canonical = envelope::encode(&timestamp, &nonce, &payload).map_err(|e| match e {
            Error::EncodingFailed(reason) => {
                Error::SigningFailed(format!("Envelope encoding failed: {}", reason))
            }
            other => other,
        })?;
        self.config.check_size(canonical.len())?;

        let signature = signer.sign(&canonical).map_err(|e| match e {
            Error::SigningFailed(_) => e,
            other => Error::SigningFailed(other.to_string()),
        })?;

        tracing::debug!("Signed envelope {} ({} bytes)", nonce, canonical.len());

        Ok(SecureMessage {
            state: MessageState::Signed {
                envelope: Envelope {
                    timestamp,
                    nonce,
                    payload,
                },
                signature,
            },
        })
    }
}

impl<R, C: Clock> MessageProtocol<R, C> {
    /// Seal a signed message for `recipient`
    ///
    /// The canonical envelope is re-encoded from the message's current
    /// fields on every call. Encrypting a sealed message again replaces
    /// its ciphertext.
    pub fn encrypt<T, K>(
        &self,
        message: &mut SecureMessage<T>,
        sender: &K,
        recipient: &EncryptionPublicKey,
    ) -> Result<()>
    where
        T: Serialize,
        K: MessageSealer + ?Sized,
    {
        let (envelope, signature) = match &message.state {
            MessageState::Signed {
                envelope,
                signature,
            }
            | MessageState::Sealed {
                envelope,
                signature,
                ..
            } => (envelope, signature),
            _ => {
                return Err(Error::EncryptionFailed(format!(
                    "Message must be signed before encryption (stage: {:?})",
                    message.stage()
                )))
            }
        };

        let mut bundle = envelope
            .to_canonical()
            .map_err(|e| Error::EncryptionFailed(format!("Envelope encoding failed: {}", e)))?;
        self.config.check_size(bundle.len())?;
        bundle.extend_from_slice(signature.as_bytes());

        let encrypted = sender.seal(&bundle, recipient).map_err(|e| match e {
            Error::EncryptionFailed(_) => e,
            other => Error::EncryptionFailed(other.to_string()),
        })?;

        tracing::debug!(
            "Sealed envelope {} for {} ({} bytes)",
            envelope.nonce,
            recipient,
            encrypted.len()
        );

        message.state = match std::mem::take(&mut message.state) {
            MessageState::Signed {
                envelope,
                signature,
            }
            | MessageState::Sealed {
                envelope,
                signature,
                ..
            } => MessageState::Sealed {
                envelope,
                signature,
                encrypted,
            },
            other => other,
        };

        Ok(())
    }

    /// Open, verify and decode a message with typed sender keys
    pub fn decrypt<T, K>(
        &self,
        message: &mut SecureMessage<T>,
        receiver: &K,
        sender_encryption: &EncryptionPublicKey,
        sender_signing: &SigningPublicKey,
    ) -> Result<()>
    where
        T: DeserializeOwned,
        K: MessageSealer + ?Sized,
    {
        self.receive(message, receiver, sender_encryption, || Ok(*sender_signing))
    }

    /// Open, verify and decode a message with encoded sender keys
    ///
    /// The signing key string is only parsed once the ciphertext has been
    /// opened and split.
    pub fn decrypt_encoded<T, K>(
        &self,
        message: &mut SecureMessage<T>,
        receiver: &K,
        sender_encryption: &str,
        sender_signing: &str,
    ) -> Result<()>
    where
        T: DeserializeOwned,
        K: MessageSealer + ?Sized,
    {
        let sender_encryption = EncryptionPublicKey::parse(sender_encryption).map_err(|e| {
            tracing::warn!("Rejected message: bad sender encryption key");
            e
        })?;
        self.receive(message, receiver, &sender_encryption, || {
            SigningPublicKey::parse(sender_signing)
        })
    }

    fn receive<T, K, F>(
        &self,
        message: &mut SecureMessage<T>,
        receiver: &K,
        sender_encryption: &EncryptionPublicKey,
        resolve_signer: F,
    ) -> Result<()>
    where
        T: DeserializeOwned,
        K: MessageSealer + ?Sized,
        F: FnOnce() -> Result<SigningPublicKey>,
    {
        let sealed = message.encrypted().ok_or_else(|| {
            Error::DecryptionFailed(format!(
                "Message holds no ciphertext (stage: {:?})",
                message.stage()
            ))
        })?;

        let (envelope, signature) = self
            .open_and_verify(sealed, receiver, sender_encryption, resolve_signer)
            .map_err(|e| {
                tracing::warn!("Rejected message from {}: {}", sender_encryption, e);
                e
            })?;

        tracing::debug!(
            "Verified envelope {} from {} ({} bytes)",
            envelope.nonce,
            sender_encryption,
            sealed.len()
        );

        let encrypted = std::mem::take(&mut message.state)
            .into_encrypted()
            .unwrap_or_default();
        message.state = MessageState::Verified {
            envelope,
            signature,
            encrypted,
        };

        Ok(())
    }

    fn open_and_verify<T, K, F>(
        &self,
        sealed: &[u8],
        receiver: &K,
        sender_encryption: &EncryptionPublicKey,
        resolve_signer: F,
    ) -> Result<(Envelope<T>, Signature)>
    where
        T: DeserializeOwned,
        K: MessageSealer + ?Sized,
        F: FnOnce() -> Result<SigningPublicKey>,
    {
        let max_sealed = self
            .config
            .max_message_size
            .saturating_add(SIGNATURE_SIZE + SEAL_OVERHEAD);
        if sealed.len() > max_sealed {
            return Err(Error::MessageTooLarge {
                size: sealed.len(),
                max: max_sealed,
            });
        }

        let opened = OpenedMessage::open(receiver, sender_encryption, sealed)?;
        let signer = resolve_signer()?;
        let (envelope, signature) = opened.verify(&signer)?.decode::<T>()?;

        let now = self.clock.now();
        self.config.check_freshness(envelope.timestamp, now)?;

        if let Some(guard) = &self.replay_guard {
            guard.check_and_record(&envelope.nonce, envelope.timestamp, now)?;
        }

        Ok((envelope, signature))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{seal, KeyPair, SigningKeyPair};
    use crate::time::FixedClock;
    use chrono::Duration;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde::Deserialize;
    use std::thread;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Chat {
        from: String,
        msg: String,
    }

    fn chat(from: &str, msg: &str) -> Chat {
        Chat {
            from: from.into(),
            msg: msg.into(),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn enc_key(kp: &KeyPair) -> String {
        kp.public_keys().encryption.encode()
    }

    fn sig_key(kp: &KeyPair) -> String {
        kp.public_keys().signing.encode()
    }

    /// Alice signs and seals `payload` for Bob
    fn alice_to_bob(alice: &KeyPair, bob: &KeyPair, payload: Chat) -> Vec<u8> {
        let mut msg = SecureMessage::sign(payload, alice).unwrap();
        msg.encrypt(alice, &enc_key(bob)).unwrap();
        msg.encrypted().unwrap().to_vec()
    }

    #[test]
    fn test_alice_and_bob_exchange() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let mut outbound = SecureMessage::sign(chat("Alice", "Hello Bob"), &alice).unwrap();
        assert_eq!(outbound.stage(), MessageStage::Signed);
        outbound.encrypt(&alice, &enc_key(&bob)).unwrap();
        assert_eq!(outbound.stage(), MessageStage::Sealed);

        let mut inbound = SecureMessage::<Chat>::from_encrypted(outbound.encrypted().unwrap().to_vec());
        assert_eq!(inbound.stage(), MessageStage::Received);
        assert!(inbound.payload().is_none());

        inbound.decrypt(&bob, &enc_key(&alice), &sig_key(&alice)).unwrap();

        assert!(inbound.is_verified());
        assert_eq!(inbound.payload(), outbound.payload());
        assert_eq!(inbound.nonce(), outbound.nonce());
        assert_eq!(inbound.timestamp(), outbound.timestamp());
        assert_eq!(inbound.signature(), outbound.signature());

        // Bob replies
        let mut reply = SecureMessage::sign(chat("Bob", "Hello Alice"), &bob).unwrap();
        reply.encrypt(&bob, &enc_key(&alice)).unwrap();

        let mut at_alice = SecureMessage::<Chat>::from_encrypted(reply.encrypted().unwrap().to_vec());
        at_alice.decrypt(&alice, &enc_key(&bob), &sig_key(&bob)).unwrap();

        assert_eq!(at_alice.into_payload().unwrap(), chat("Bob", "Hello Alice"));
    }

    #[test]
    fn test_nanosecond_timestamp_survives() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let ts = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();

        let mut protocol = MessageProtocol::default().with_clock(FixedClock(ts));
        let mut msg = protocol.sign(chat("Alice", "tick"), &alice).unwrap();
        protocol
            .encrypt(&mut msg, &alice, &bob.public_keys().encryption)
            .unwrap();

        let mut inbound = SecureMessage::<Chat>::from_encrypted(msg.encrypted().unwrap().to_vec());
        protocol
            .decrypt(
                &mut inbound,
                &bob,
                &alice.public_keys().encryption,
                &alice.public_keys().signing,
            )
            .unwrap();

        assert_eq!(inbound.timestamp(), Some(ts));
    }

    #[test]
    fn test_tampering_any_byte_is_detected() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let wire = alice_to_bob(&alice, &bob, chat("Alice", "tamper me"));

        for i in 0..wire.len() {
            let mut tampered = wire.clone();
            tampered[i] ^= 0x01;

            let mut msg = SecureMessage::<Chat>::from_encrypted(tampered);
            let result = msg.decrypt(&bob, &enc_key(&alice), &sig_key(&alice));

            assert!(
                matches!(result, Err(Error::DecryptionFailed(_))),
                "byte {} not detected",
                i
            );
            assert_eq!(msg.stage(), MessageStage::Received);
        }
    }

    #[test]
    fn test_wrong_receiver_cannot_decrypt() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let eve = KeyPair::generate();
        let wire = alice_to_bob(&alice, &bob, chat("Alice", "for Bob only"));

        let mut msg = SecureMessage::<Chat>::from_encrypted(wire);
        let result = msg.decrypt(&eve, &enc_key(&alice), &sig_key(&alice));

        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
        assert!(msg.payload().is_none());
    }

    #[test]
    fn test_wrong_claimed_sender_cannot_decrypt() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let eve = KeyPair::generate();
        let wire = alice_to_bob(&alice, &bob, chat("Alice", "hi"));

        let mut msg = SecureMessage::<Chat>::from_encrypted(wire);
        let result = msg.decrypt(&bob, &enc_key(&eve), &sig_key(&alice));

        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
    }

    #[test]
    fn test_wrong_signer_fails_verification() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let wire = alice_to_bob(&alice, &bob, chat("Alice", "hi"));

        // Bob mistakenly verifies with his own signing key
        let mut msg = SecureMessage::<Chat>::from_encrypted(wire);
        let result = msg.decrypt(&bob, &enc_key(&alice), &sig_key(&bob));

        assert!(matches!(result, Err(Error::VerificationFailed)));
        assert_eq!(msg.stage(), MessageStage::Received);
    }

    #[test]
    fn test_signed_by_someone_else_fails_verification() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let mallory_sig = SigningKeyPair::generate();

        // Sealed with Alice's encryption key but signed by Mallory
        let mut msg = SecureMessage::sign(chat("Alice", "trust me"), &mallory_sig).unwrap();
        msg.encrypt(&alice, &enc_key(&bob)).unwrap();

        let mut inbound = SecureMessage::<Chat>::from_encrypted(msg.encrypted().unwrap().to_vec());
        let result = inbound.decrypt(&bob, &enc_key(&alice), &sig_key(&alice));

        assert!(matches!(result, Err(Error::VerificationFailed)));
    }

    #[test]
    fn test_short_plaintext_is_malformed() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let sealed = seal(&alice.encryption, &bob.public_keys().encryption, &[1u8; 63]).unwrap();

        let mut msg = SecureMessage::<Chat>::from_encrypted(sealed);
        let result = msg.decrypt(&bob, &enc_key(&alice), &sig_key(&alice));

        assert!(matches!(result, Err(Error::MalformedMessage(_))));
    }

    #[test]
    fn test_payload_type_mismatch_fails_decoding() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let wire = alice_to_bob(&alice, &bob, chat("Alice", "not a number"));

        let mut msg = SecureMessage::<u64>::from_encrypted(wire);
        let result = msg.decrypt(&bob, &enc_key(&alice), &sig_key(&alice));

        assert!(matches!(result, Err(Error::DecodingFailed(_))));
    }

    #[test]
    fn test_malformed_key_strings() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let wire = alice_to_bob(&alice, &bob, chat("Alice", "hi"));

        let mut msg = SecureMessage::<Chat>::from_encrypted(wire.clone());
        assert!(matches!(
            msg.decrypt(&bob, "not-a-key", &sig_key(&alice)),
            Err(Error::InvalidKey(_))
        ));

        let mut msg = SecureMessage::<Chat>::from_encrypted(wire.clone());
        assert!(matches!(
            msg.decrypt(&bob, &enc_key(&alice), "not-a-key"),
            Err(Error::InvalidKey(_))
        ));

        // Key types are not interchangeable
        let mut msg = SecureMessage::<Chat>::from_encrypted(wire);
        assert!(matches!(
            msg.decrypt(&bob, &sig_key(&alice), &enc_key(&alice)),
            Err(Error::InvalidKey(_))
        ));

        let mut outbound = SecureMessage::sign(chat("Alice", "hi"), &alice).unwrap();
        assert!(matches!(
            outbound.encrypt(&alice, "not-a-key"),
            Err(Error::EncryptionFailed(_))
        ));
        assert!(matches!(
            outbound.encrypt(&alice, &sig_key(&bob)),
            Err(Error::EncryptionFailed(_))
        ));
        assert_eq!(outbound.stage(), MessageStage::Signed);
    }

    #[test]
    fn test_encrypt_requires_signed_message() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let mut empty = SecureMessage::<Chat>::new();
        assert!(matches!(
            empty.encrypt(&alice, &enc_key(&bob)),
            Err(Error::EncryptionFailed(_))
        ));

        let mut received = SecureMessage::<Chat>::from_encrypted(vec![0; 128]);
        assert!(matches!(
            received.encrypt(&alice, &enc_key(&bob)),
            Err(Error::EncryptionFailed(_))
        ));
    }

    #[test]
    fn test_decrypt_requires_ciphertext() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let mut signed = SecureMessage::sign(chat("Alice", "hi"), &alice).unwrap();
        let result = signed.decrypt(&bob, &enc_key(&alice), &sig_key(&alice));

        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
        assert_eq!(signed.stage(), MessageStage::Signed);
    }

    #[test]
    fn test_encrypt_reencodes_current_fields() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let mut msg = SecureMessage::sign(chat("Alice", "original"), &alice).unwrap();
        if let MessageState::Signed { envelope, .. } = &mut msg.state {
            envelope.payload.msg = "edited after signing".into();
        }
        msg.encrypt(&alice, &enc_key(&bob)).unwrap();

        let mut inbound = SecureMessage::<Chat>::from_encrypted(msg.encrypted().unwrap().to_vec());
        let result = inbound.decrypt(&bob, &enc_key(&alice), &sig_key(&alice));

        assert!(matches!(result, Err(Error::VerificationFailed)));
    }

    #[test]
    fn test_reencrypt_for_another_recipient() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let carol = KeyPair::generate();

        let mut msg = SecureMessage::sign(chat("Alice", "to everyone"), &alice).unwrap();
        msg.encrypt(&alice, &enc_key(&bob)).unwrap();
        let for_bob = msg.encrypted().unwrap().to_vec();
        msg.encrypt(&alice, &enc_key(&carol)).unwrap();
        let for_carol = msg.encrypted().unwrap().to_vec();

        assert_ne!(for_bob, for_carol);

        let mut at_carol = SecureMessage::<Chat>::from_encrypted(for_carol);
        at_carol.decrypt(&carol, &enc_key(&alice), &sig_key(&alice)).unwrap();

        let mut at_bob = SecureMessage::<Chat>::from_encrypted(for_bob);
        at_bob.decrypt(&bob, &enc_key(&alice), &sig_key(&alice)).unwrap();

        assert_eq!(at_carol.nonce(), at_bob.nonce());
    }

    #[test]
    fn test_seeded_rng_gives_deterministic_nonce() {
        let alice = KeyPair::generate();
        let clock = FixedClock(at(1_700_000_000));

        let mut first = MessageProtocol::default()
            .with_rng(StdRng::seed_from_u64(42))
            .with_clock(clock);
        let mut second = MessageProtocol::default()
            .with_rng(StdRng::seed_from_u64(42))
            .with_clock(clock);

        let a = first.sign(chat("Alice", "same"), &alice).unwrap();
        let b = second.sign(chat("Alice", "same"), &alice).unwrap();

        assert_eq!(a.nonce(), b.nonce());
        assert_eq!(a.signature(), b.signature());

        let c = first.sign(chat("Alice", "same"), &alice).unwrap();
        assert_ne!(a.nonce(), c.nonce());
    }

    #[test]
    fn test_stale_message_rejected() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let mut sender = MessageProtocol::default().with_clock(FixedClock(at(1_700_000_000)));
        let mut msg = sender.sign(chat("Alice", "old news"), &alice).unwrap();
        sender
            .encrypt(&mut msg, &alice, &bob.public_keys().encryption)
            .unwrap();
        let wire = msg.encrypted().unwrap().to_vec();

        let config = ProtocolConfig::default().with_max_message_age(Duration::minutes(5));

        let fresh = MessageProtocol::new(config.clone()).with_clock(FixedClock(at(1_700_000_060)));
        let mut inbound = SecureMessage::<Chat>::from_encrypted(wire.clone());
        fresh
            .decrypt_encoded(&mut inbound, &bob, &enc_key(&alice), &sig_key(&alice))
            .unwrap();

        let late = MessageProtocol::new(config).with_clock(FixedClock(at(1_700_001_000)));
        let mut inbound = SecureMessage::<Chat>::from_encrypted(wire);
        let result = late.decrypt_encoded(&mut inbound, &bob, &enc_key(&alice), &sig_key(&alice));

        assert!(matches!(result, Err(Error::StaleMessage(_))));
        assert!(!inbound.is_verified());
    }

    #[test]
    fn test_replay_rejected() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let wire = alice_to_bob(&alice, &bob, chat("Alice", "pay 10 coins"));

        let guard = Arc::new(ReplayGuard::new(Duration::minutes(10)));
        let protocol = MessageProtocol::default().with_replay_guard(Arc::clone(&guard));

        let mut first = SecureMessage::<Chat>::from_encrypted(wire.clone());
        protocol
            .decrypt_encoded(&mut first, &bob, &enc_key(&alice), &sig_key(&alice))
            .unwrap();

        let mut again = SecureMessage::<Chat>::from_encrypted(wire);
        let result = protocol.decrypt_encoded(&mut again, &bob, &enc_key(&alice), &sig_key(&alice));

        assert!(matches!(result, Err(Error::ReplayDetected(_))));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_size_limits() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let big = chat("Alice", &"x".repeat(512));

        let mut tight = MessageProtocol::new(ProtocolConfig::default().with_max_message_size(256));
        assert!(matches!(
            tight.sign(big.clone(), &alice),
            Err(Error::MessageTooLarge { .. })
        ));

        let wire = alice_to_bob(&alice, &bob, big);
        let mut inbound = SecureMessage::<Chat>::from_encrypted(wire);
        let result = tight.decrypt(
            &mut inbound,
            &bob,
            &alice.public_keys().encryption,
            &alice.public_keys().signing,
        );
        assert!(matches!(result, Err(Error::MessageTooLarge { .. })));
    }

    #[test]
    fn test_base64_wire() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let mut msg = SecureMessage::sign(chat("Alice", "over text"), &alice).unwrap();
        assert!(msg.to_base64().is_none());
        msg.encrypt(&alice, &enc_key(&bob)).unwrap();
        let armored = msg.to_base64().unwrap();

        let mut inbound = SecureMessage::<Chat>::from_base64(&armored).unwrap();
        inbound.decrypt(&bob, &enc_key(&alice), &sig_key(&alice)).unwrap();
        assert_eq!(inbound.payload().unwrap().msg, "over text");

        assert!(matches!(
            SecureMessage::<Chat>::from_base64("@@not base64@@"),
            Err(Error::DecodingFailed(_))
        ));
    }

    #[test]
    fn test_signer_failure_is_signing_error() {
        struct OfflineSigner;

        impl MessageSigner for OfflineSigner {
            fn public_key(&self) -> SigningPublicKey {
                SigningKeyPair::generate().public_key()
            }
            fn sign(&self, _message: &[u8]) -> Result<Signature> {
                Err(Error::KeyDerivationFailed("token removed".into()))
            }
        }

        let result = SecureMessage::sign(chat("Alice", "hi"), &OfflineSigner);
        assert!(matches!(result, Err(Error::SigningFailed(_))));
    }

    #[test]
    fn test_unencodable_payload_is_signing_error() {
        let alice = KeyPair::generate();
        let mut payload = std::collections::BTreeMap::new();
        payload.insert((1u8, 2u8), "tuple keys");

        let result = SecureMessage::sign(payload, &alice);
        assert!(matches!(result, Err(Error::SigningFailed(_))));
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        sensor: String,
        value: f64,
    }

    #[test]
    fn test_non_finite_payload_is_signing_error() {
        let alice = KeyPair::generate();

        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let reading = Reading {
                sensor: "t1".into(),
                value,
            };
            let result = SecureMessage::sign(reading, &alice);
            assert!(matches!(result, Err(Error::SigningFailed(_))), "{} signed", value);
        }
    }

    #[test]
    fn test_non_finite_payload_is_encryption_error() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let reading = Reading {
            sensor: "t1".into(),
            value: 21.5,
        };
        let mut msg = SecureMessage::sign(reading, &alice).unwrap();
        if let MessageState::Signed { envelope, .. } = &mut msg.state {
            envelope.payload.value = f64::NAN;
        }

        let result = msg.encrypt(&alice, &enc_key(&bob));
        assert!(matches!(result, Err(Error::EncryptionFailed(_))));
        assert_eq!(msg.stage(), MessageStage::Signed);
    }

    #[test]
    fn test_finite_float_payload_round_trips() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let reading = Reading {
            sensor: "t1".into(),
            value: -273.15,
        };
        let mut msg = SecureMessage::sign(reading.clone(), &alice).unwrap();
        msg.encrypt(&alice, &enc_key(&bob)).unwrap();

        let mut inbound = SecureMessage::<Reading>::from_encrypted(msg.encrypted().unwrap().to_vec());
        inbound.decrypt(&bob, &enc_key(&alice), &sig_key(&alice)).unwrap();

        assert_eq!(inbound.into_payload(), Some(reading));
    }

    #[test]
    fn test_old_message_cannot_be_replayed() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let sent_at = at(1_700_000_000);

        let mut sender = MessageProtocol::default().with_clock(FixedClock(sent_at));
        let mut msg = sender.sign(chat("Alice", "pay 10 coins"), &alice).unwrap();
        sender
            .encrypt(&mut msg, &alice, &bob.public_keys().encryption)
            .unwrap();
        let wire = msg.encrypted().unwrap().to_vec();

        // An hour later, with a ten-minute guard and no freshness window
        let guard = Arc::new(ReplayGuard::new(Duration::minutes(10)));
        let receiver = MessageProtocol::default()
            .with_clock(FixedClock(sent_at + Duration::hours(1)))
            .with_replay_guard(Arc::clone(&guard));

        for _ in 0..3 {
            let mut delivery = SecureMessage::<Chat>::from_encrypted(wire.clone());
            let result =
                receiver.decrypt_encoded(&mut delivery, &bob, &enc_key(&alice), &sig_key(&alice));

            assert!(matches!(result, Err(Error::ReplayDetected(_))));
            assert!(!delivery.is_verified());
        }
    }

    #[test]
    fn test_concurrent_messages_share_keys() {
        let alice = Arc::new(KeyPair::generate());
        let bob = Arc::new(KeyPair::generate());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let alice = Arc::clone(&alice);
                let bob = Arc::clone(&bob);
                thread::spawn(move || {
                    let text = format!("message {}", i);
                    let wire = alice_to_bob(&alice, &bob, chat("Alice", &text));
                    let mut inbound = SecureMessage::<Chat>::from_encrypted(wire);
                    inbound.decrypt(&*bob, &enc_key(&alice), &sig_key(&alice)).unwrap();
                    inbound.into_payload().unwrap().msg == text
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_round_trip_recovers_payload(from in ".{0,32}", msg in ".{0,256}") {
            let alice = KeyPair::generate();
            let bob = KeyPair::generate();
            let payload = chat(&from, &msg);

            let wire = alice_to_bob(&alice, &bob, payload.clone());
            let mut inbound = SecureMessage::<Chat>::from_encrypted(wire);
            inbound.decrypt(&bob, &enc_key(&alice), &sig_key(&alice)).unwrap();

            prop_assert_eq!(inbound.into_payload(), Some(payload));
        }
    }
}
