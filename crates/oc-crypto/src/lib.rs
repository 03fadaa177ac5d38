#![forbid(unsafe_code)]

//! Envelope cryptography for Onion Courier relays.
//!
//! A sender seals one hop's payload to the relay's X25519 key, derived from
//! the relay's Ed25519 identity. The relay opens it with the matching secret,
//! which only exists in zero-on-drop memory for the duration of the call.

pub mod armor;
pub mod envelope;
pub mod keys;
pub mod pem;
pub mod secret;
pub mod utils;

#[cfg(test)]
mod proptests;

pub use envelope::{open, open_with_keypair, seal, Envelope, EnvelopeError};
pub use keys::{
    to_exchange_public, to_exchange_secret, ExchangePublic, ExchangeSecret, KeyError, Keypair,
    SigningPublicKey,
};
pub use secret::ScopedSecret;
