//! Per-hop envelope: X25519 + XChaCha20-Poly1305.
//!
//! Wire layout:
//!
//! ```text
//! ephemeral_public (32) ‖ nonce (24) ‖ ciphertext ‖ tag (16)
//! ```
//!
//! The raw X25519 output between the ephemeral secret and the recipient's
//! exchange public key is used directly as the AEAD key. Associated data is
//! empty. Every message uses a fresh ephemeral key and a fresh random nonce.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand_core::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};

use crate::armor;
use crate::keys::{ExchangePublic, ExchangeSecret, Keypair, EXCHANGE_KEY_LENGTH};
use crate::secret::ScopedSecret;

pub const EPHEMERAL_PUBLIC_LENGTH: usize = EXCHANGE_KEY_LENGTH;
pub const NONCE_LENGTH: usize = 24;
pub const TAG_LENGTH: usize = 16;
/// Anything shorter cannot hold the ephemeral key and nonce.
pub const MIN_ENVELOPE_LENGTH: usize = EPHEMERAL_PUBLIC_LENGTH + NONCE_LENGTH;

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {len} bytes")]
    Malformed { len: usize },
    #[error("envelope is not valid base64")]
    Encoding(#[from] base64::DecodeError),
    #[error("authentication failed")]
    Authentication,
    #[error("key agreement produced a non-contributory secret")]
    WeakKey,
    #[error("encryption failed")]
    EncryptFailed,
    #[error("random source unavailable")]
    Rng(#[from] getrandom::Error),
}

/// A parsed envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub ephemeral_public: ExchangePublic,
    pub nonce: [u8; NONCE_LENGTH],
    /// Ciphertext with the Poly1305 tag appended.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Split raw envelope bytes. The length check happens here, before any
    /// cryptographic work.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if bytes.len() < MIN_ENVELOPE_LENGTH {
            return Err(EnvelopeError::Malformed { len: bytes.len() });
        }
        let (eph, rest) = bytes.split_at(EPHEMERAL_PUBLIC_LENGTH);
        let (nonce, ciphertext) = rest.split_at(NONCE_LENGTH);

        let mut eph_arr = [0u8; EPHEMERAL_PUBLIC_LENGTH];
        eph_arr.copy_from_slice(eph);
        let mut nonce_arr = [0u8; NONCE_LENGTH];
        nonce_arr.copy_from_slice(nonce);

        Ok(Self {
            ephemeral_public: ExchangePublic::from_bytes(eph_arr),
            nonce: nonce_arr,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Decode armored or plain base64 text.
    pub fn from_text(text: &[u8]) -> Result<Self, EnvelopeError> {
        let bytes = armor::decode(text)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MIN_ENVELOPE_LENGTH + self.ciphertext.len());
        out.extend_from_slice(self.ephemeral_public.as_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Unwrapped base64.
    pub fn to_base64(&self) -> String {
        armor::encode(&self.to_bytes())
    }

    /// Base64 wrapped at 64 columns with CRLF, as written to files and sent
    /// to relays.
    pub fn to_armored(&self) -> String {
        armor::armor(&self.to_bytes())
    }
}

/// Seal `plaintext` to a recipient's exchange public key.
pub fn seal(recipient: &ExchangePublic, plaintext: &[u8]) -> Result<Envelope, EnvelopeError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519PublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(&X25519PublicKey::from(*recipient.as_bytes()));
    if !shared.was_contributory() {
        return Err(EnvelopeError::WeakKey);
    }
    let key = ScopedSecret::copy_from(shared.as_bytes());
    drop(shared);

    let mut nonce = [0u8; NONCE_LENGTH];
    getrandom::getrandom(&mut nonce)?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.expose()));
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &[],
            },
        )
        .map_err(|_| EnvelopeError::EncryptFailed)?;

    Ok(Envelope {
        ephemeral_public: ExchangePublic::from_bytes(ephemeral_public.to_bytes()),
        nonce,
        ciphertext,
    })
}

/// Open a parsed envelope.
pub fn open_envelope(
    recipient: &ExchangeSecret,
    envelope: &Envelope,
) -> Result<Vec<u8>, EnvelopeError> {
    let key = recipient
        .diffie_hellman(&envelope.ephemeral_public)
        .ok_or(EnvelopeError::WeakKey)?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.expose()));
    cipher
        .decrypt(
            XNonce::from_slice(&envelope.nonce),
            Payload {
                msg: &envelope.ciphertext,
                aad: &[],
            },
        )
        .map_err(|_| EnvelopeError::Authentication)
}

/// Open envelope text (armored or plain base64) with an exchange secret.
pub fn open(recipient: &ExchangeSecret, text: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let envelope = Envelope::from_text(text)?;
    open_envelope(recipient, &envelope)
}

/// Open envelope text with a relay's signing keypair. The exchange secret is
/// derived for this call only and wiped before returning.
pub fn open_with_keypair(keypair: &Keypair, text: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let envelope = Envelope::from_text(text)?;
    let secret = keypair.exchange_secret();
    open_envelope(&secret, &envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let relay = Keypair::generate();
        let plaintext = b"X-OC-To: relay2.example:8080 hunter2\n\nHello";

        let envelope = seal(&relay.exchange_public(), plaintext).unwrap();
        assert_eq!(
            envelope.ciphertext.len(),
            plaintext.len() + TAG_LENGTH
        );

        let opened = open_with_keypair(&relay, envelope.to_armored().as_bytes()).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_open_accepts_unwrapped_base64() {
        let relay = Keypair::generate();
        let envelope = seal(&relay.exchange_public(), b"payload").unwrap();
        let opened = open(&relay.exchange_secret(), envelope.to_base64().as_bytes()).unwrap();
        assert_eq!(opened, b"payload");
    }

    #[test]
    fn test_fresh_ephemeral_and_nonce_per_seal() {
        let relay = Keypair::generate();
        let a = seal(&relay.exchange_public(), b"same").unwrap();
        let b = seal(&relay.exchange_public(), b"same").unwrap();
        assert_ne!(a.ephemeral_public, b.ephemeral_public);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_recipient_fails_authentication() {
        let relay = Keypair::generate();
        let other = Keypair::generate();
        let envelope = seal(&relay.exchange_public(), b"secret").unwrap();
        let err = open_with_keypair(&other, envelope.to_armored().as_bytes()).unwrap_err();
        assert!(matches!(err, EnvelopeError::Authentication));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let relay = Keypair::generate();
        let mut bytes = seal(&relay.exchange_public(), b"secret").unwrap().to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x80;
        let text = armor::armor(&bytes);
        let err = open_with_keypair(&relay, text.as_bytes()).unwrap_err();
        assert!(matches!(err, EnvelopeError::Authentication));
    }

    #[test]
    fn test_short_envelope_is_malformed() {
        let relay = Keypair::generate();
        let text = armor::armor(&[0u8; MIN_ENVELOPE_LENGTH - 1]);
        let err = open_with_keypair(&relay, text.as_bytes()).unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed { len: 55 }));
    }

    #[test]
    fn test_header_only_envelope_opens_to_empty_is_rejected() {
        // 56 bytes parse, but there is no tag to verify.
        let relay = Keypair::generate();
        let mut bytes = vec![0u8; MIN_ENVELOPE_LENGTH];
        bytes[..32].copy_from_slice(Keypair::generate().exchange_public().as_bytes());
        let err = open_with_keypair(&relay, armor::armor(&bytes).as_bytes()).unwrap_err();
        assert!(matches!(err, EnvelopeError::Authentication));
    }

    #[test]
    fn test_invalid_base64_is_encoding_error() {
        let relay = Keypair::generate();
        let err = open_with_keypair(&relay, b"%%%not base64%%%").unwrap_err();
        assert!(matches!(err, EnvelopeError::Encoding(_)));
    }

    #[test]
    fn test_low_order_recipient_rejected() {
        let zero = ExchangePublic::from_bytes([0u8; 32]);
        assert!(matches!(seal(&zero, b"x"), Err(EnvelopeError::WeakKey)));
    }

    #[test]
    fn test_envelope_bytes_layout() {
        let relay = Keypair::generate();
        let envelope = seal(&relay.exchange_public(), b"abc").unwrap();
        let bytes = envelope.to_bytes();
        assert_eq!(&bytes[..32], envelope.ephemeral_public.as_bytes());
        assert_eq!(&bytes[32..56], &envelope.nonce);
        assert_eq!(Envelope::from_bytes(&bytes).unwrap(), envelope);
    }
}
