//! Receive-path stages.
//!
//! ```text
//! sealed bytes ──open──► OpenedMessage ──verify──► VerifiedContent ──decode──► Envelope<T>
//!                   │                      │                         │
//!                   ▼                      ▼                         ▼
//!           DecryptionFailed      VerificationFailed           DecodingFailed
//!           MalformedMessage
//! ```
//!
//! Each stage consumes the previous one, and only [`VerifiedContent`] can be
//! decoded, so bytes are never parsed before their signature has been checked.

use serde::de::DeserializeOwned;

use crate::crypto::{verify, EncryptionPublicKey, MessageSealer, Signature, SigningPublicKey, SIGNATURE_SIZE};
use crate::envelope::{self, Envelope};
use crate::error::{Error, Result};

/// Decrypted plaintext split into content and trailing signature, not yet trusted
pub(crate) struct OpenedMessage {
    content: Vec<u8>,
    signature: Signature,
}

impl OpenedMessage {
    /// Open `sealed` and split off the trailing signature
    pub(crate) fn open<K: MessageSealer + ?Sized>(
        receiver: &K,
        sender: &EncryptionPublicKey,
        sealed: &[u8],
    ) -> Result<Self> {
        let mut plaintext = receiver.open(sealed, sender).map_err(|e| match e {
            Error::DecryptionFailed(_) => e,
            other => Error::DecryptionFailed(other.to_string()),
        })?;

        if plaintext.len() < SIGNATURE_SIZE {
            return Err(Error::MalformedMessage(format!(
                "decrypted plaintext is {} bytes, shorter than a {}-byte signature",
                plaintext.len(),
                SIGNATURE_SIZE
            )));
        }

        let split = plaintext.len() - SIGNATURE_SIZE;
        let signature = Signature::from_slice(&plaintext[split..])?;
        plaintext.truncate(split);

        Ok(Self {
            content: plaintext,
            signature,
        })
    }

    /// Check the signature against the claimed signer
    pub(crate) fn verify(self, signer: &SigningPublicKey) -> Result<VerifiedContent> {
        verify(signer, &self.content, &self.signature)?;

        Ok(VerifiedContent {
            content: self.content,
            signature: self.signature,
        })
    }
}

/// Content whose signature has been verified
pub(crate) struct VerifiedContent {
    content: Vec<u8>,
    signature: Signature,
}

impl VerifiedContent {
    /// Decode the canonical envelope
    pub(crate) fn decode<T: DeserializeOwned>(self) -> Result<(Envelope<T>, Signature)> {
        let envelope = envelope::decode(&self.content)?;
        Ok((envelope, self.signature))
    }
}
