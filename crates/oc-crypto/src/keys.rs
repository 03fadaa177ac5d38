//! Relay identity keys and their Diffie-Hellman form.
//!
//! A relay is identified by an Ed25519 keypair. Envelopes are sealed to the
//! X25519 form of that key:
//!
//! - exchange secret = `SHA-512(ed25519_seed)[..32]`
//! - exchange public = Montgomery form of the Ed25519 public point
//!
//! The conversion only goes one way. The public half is always mapped from
//! the curve point, never hashed.

use ed25519_dalek::{SigningKey, VerifyingKey, KEYPAIR_LENGTH, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};
use rand_core::OsRng;
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::secret::ScopedSecret;

/// Size of an X25519 scalar or point.
pub const EXCHANGE_KEY_LENGTH: usize = 32;

/// Error type for key handling.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("public key is not a valid curve point")]
    InvalidPoint,
    #[error("private key does not match its embedded public key")]
    PublicKeyMismatch,
}

/// A relay's long-lived Ed25519 signing keypair.
///
/// The signing key wipes itself on drop.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from the OS random source.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild a keypair from its 32-byte seed.
    pub fn from_seed(seed: &ScopedSecret<SECRET_KEY_LENGTH>) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed.expose()),
        }
    }

    /// Rebuild a keypair from stored private key bytes.
    ///
    /// Accepts either the bare 32-byte seed or the 64-byte `seed ‖ public`
    /// layout. In the latter case the embedded public key must match.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        match bytes.len() {
            SECRET_KEY_LENGTH => {
                let seed = ScopedSecret::<SECRET_KEY_LENGTH>::from_slice(bytes).ok_or(
                    KeyError::InvalidKeyLength {
                        expected: SECRET_KEY_LENGTH,
                        got: bytes.len(),
                    },
                )?;
                Ok(Self::from_seed(&seed))
            }
            KEYPAIR_LENGTH => {
                let seed = ScopedSecret::<SECRET_KEY_LENGTH>::from_slice(&bytes[..SECRET_KEY_LENGTH])
                    .ok_or(KeyError::InvalidKeyLength {
                        expected: KEYPAIR_LENGTH,
                        got: bytes.len(),
                    })?;
                let keypair = Self::from_seed(&seed);
                if keypair.public().as_bytes()[..] != bytes[SECRET_KEY_LENGTH..] {
                    return Err(KeyError::PublicKeyMismatch);
                }
                Ok(keypair)
            }
            got => Err(KeyError::InvalidKeyLength {
                expected: KEYPAIR_LENGTH,
                got,
            }),
        }
    }

    /// The 32-byte seed.
    pub fn seed(&self) -> ScopedSecret<SECRET_KEY_LENGTH> {
        let mut seed = ScopedSecret::zeroed();
        seed.expose_mut().copy_from_slice(self.signing.as_bytes());
        seed
    }

    /// The 64-byte `seed ‖ public` layout used for key files.
    pub fn to_keypair_bytes(&self) -> ScopedSecret<KEYPAIR_LENGTH> {
        let mut bytes = ScopedSecret::zeroed();
        let out = bytes.expose_mut();
        out[..SECRET_KEY_LENGTH].copy_from_slice(self.signing.as_bytes());
        out[SECRET_KEY_LENGTH..].copy_from_slice(self.signing.verifying_key().as_bytes());
        bytes
    }

    pub fn public(&self) -> SigningPublicKey {
        SigningPublicKey(self.signing.verifying_key().to_bytes())
    }

    /// Derive the exchange secret for a single use.
    pub fn exchange_secret(&self) -> ExchangeSecret {
        to_exchange_secret(&self.seed())
    }

    /// The exchange public key senders seal to.
    pub fn exchange_public(&self) -> ExchangePublic {
        ExchangePublic(self.signing.verifying_key().to_montgomery().to_bytes())
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public())
            .finish()
    }
}

/// An Ed25519 public key as raw bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SigningPublicKey([u8; PUBLIC_KEY_LENGTH]);

impl SigningPublicKey {
    /// Parse raw public key bytes. The point itself is validated lazily by
    /// [`SigningPublicKey::to_exchange_public`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let arr: [u8; PUBLIC_KEY_LENGTH] =
            bytes.try_into().map_err(|_| KeyError::InvalidKeyLength {
                expected: PUBLIC_KEY_LENGTH,
                got: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    pub fn to_exchange_public(&self) -> Result<ExchangePublic, KeyError> {
        to_exchange_public(&self.0)
    }
}

/// X25519 secret derived from a signing seed. Wiped on drop.
#[derive(Clone, Debug)]
pub struct ExchangeSecret(ScopedSecret<EXCHANGE_KEY_LENGTH>);

impl ExchangeSecret {
    pub fn expose(&self) -> &[u8; EXCHANGE_KEY_LENGTH] {
        self.0.expose()
    }

    /// The scalar as an x25519 secret. The intermediate copy is wiped.
    fn static_secret(&self) -> StaticSecret {
        let bytes = Zeroizing::new(*self.0.expose());
        StaticSecret::from(*bytes)
    }

    pub fn public(&self) -> ExchangePublic {
        let secret = self.static_secret();
        ExchangePublic(X25519PublicKey::from(&secret).to_bytes())
    }

    /// X25519 with `their_public`.
    ///
    /// Returns `None` when the result is the all-zero value produced by a
    /// low-order point.
    pub fn diffie_hellman(
        &self,
        their_public: &ExchangePublic,
    ) -> Option<ScopedSecret<EXCHANGE_KEY_LENGTH>> {
        let secret = self.static_secret();
        let shared = secret.diffie_hellman(&X25519PublicKey::from(their_public.0));
        if !shared.was_contributory() {
            return None;
        }
        Some(ScopedSecret::copy_from(shared.as_bytes()))
    }
}

/// X25519 public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExchangePublic([u8; EXCHANGE_KEY_LENGTH]);

impl ExchangePublic {
    pub fn from_bytes(bytes: [u8; EXCHANGE_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; EXCHANGE_KEY_LENGTH] {
        &self.0
    }
}

/// Convert an Ed25519 seed into an X25519 secret.
///
/// `SHA-512(seed)` truncated to the 32-byte scalar size. Clamping is left to
/// the X25519 function itself. Deterministic.
pub fn to_exchange_secret(seed: &ScopedSecret<SECRET_KEY_LENGTH>) -> ExchangeSecret {
    let mut digest = Sha512::digest(seed.expose());
    let mut secret = ScopedSecret::<EXCHANGE_KEY_LENGTH>::zeroed();
    secret
        .expose_mut()
        .copy_from_slice(&digest[..EXCHANGE_KEY_LENGTH]);
    digest.as_mut_slice().zeroize();
    ExchangeSecret(secret)
}

/// Convert an Ed25519 public key into its X25519 (Montgomery) form.
pub fn to_exchange_public(sign_public: &[u8; PUBLIC_KEY_LENGTH]) -> Result<ExchangePublic, KeyError> {
    let verifying = VerifyingKey::from_bytes(sign_public).map_err(|_| KeyError::InvalidPoint)?;
    Ok(ExchangePublic(verifying.to_montgomery().to_bytes()))
}
