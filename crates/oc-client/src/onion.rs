//! Layer construction for an explicit route.
//!
//! For a route `[h0, h1, ..., hn]` the client uploads to `h0`. Layer `i` is
//! what `h(i)` receives: a routing header naming `h(i+1)` and, after a blank
//! line, layer `i+1`. Layers for hops with a public key are sealed to that
//! key; hops without one (middlemen) get their layer in the clear. The last
//! hop is the destination and receives the message itself, sealed to its key
//! when the route names one.

use oc_crypto::{seal, EnvelopeError, KeyError, SigningPublicKey};
use oc_relay::HopHeader;

use crate::datafile::RouteEntry;

/// Line terminator used inside layers.
const EOL: &str = "\r\n";

#[derive(Debug, thiserror::Error)]
pub enum OnionError {
    #[error("route needs at least two hops, got {0}")]
    RouteTooShort(usize),
    #[error("failed to load hop key: {0}")]
    Key(#[from] oc_crypto::pem::PemError),
    #[error("hop key is not usable: {0}")]
    InvalidKey(#[from] KeyError),
    #[error("sealing failed: {0}")]
    Seal(#[from] EnvelopeError),
}

/// One hop of a route.
#[derive(Clone)]
pub struct Hop {
    pub address: String,
    pub password: String,
    /// Set for guard relays, which expect a sealed layer.
    pub public_key: Option<SigningPublicKey>,
}

impl Hop {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            public_key: None,
        }
    }

    pub fn sealed_to(mut self, key: SigningPublicKey) -> Self {
        self.public_key = Some(key);
        self
    }

    /// Load the hop's key file, if the entry names one.
    pub fn from_entry(entry: &RouteEntry) -> Result<Self, OnionError> {
        let public_key = match &entry.public_key_path {
            Some(path) => Some(oc_crypto::pem::load_public_key(path)?),
            None => None,
        };
        Ok(Self {
            address: entry.address.clone(),
            password: entry.password.clone(),
            public_key,
        })
    }

    fn header(&self) -> HopHeader {
        HopHeader::new(self.address.clone(), self.password.clone())
    }
}

impl std::fmt::Debug for Hop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hop")
            .field("sealed", &self.public_key.is_some())
            .finish_non_exhaustive()
    }
}

/// The outermost layer and where to deliver it.
pub struct Onion {
    pub entry_address: String,
    pub entry_password: String,
    pub payload: Vec<u8>,
}

/// Build the layered payload for `route`, carrying `message` to the last hop.
pub fn build_onion(route: &[Hop], message: &str) -> Result<Onion, OnionError> {
    if route.len() < 2 {
        return Err(OnionError::RouteTooShort(route.len()));
    }

    // A keyed destination gets the message sealed to it as well.
    let destination = &route[route.len() - 1];
    let mut payload = match &destination.public_key {
        Some(key) => seal(&key.to_exchange_public()?, message.as_bytes())?.to_armored(),
        None => message.to_string(),
    };
    for pair in route.windows(2).rev() {
        let (current, next) = (&pair[0], &pair[1]);
        let layer = format!("{}{EOL}{EOL}{}", next.header().serialize(), payload);
        payload = match &current.public_key {
            Some(key) => seal(&key.to_exchange_public()?, layer.as_bytes())?.to_armored(),
            None => layer,
        };
    }

    Ok(Onion {
        entry_address: route[0].address.clone(),
        entry_password: route[0].password.clone(),
        payload: payload.into_bytes(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_crypto::{open_with_keypair, Keypair};
    use oc_relay::peel;

    #[test]
    fn test_single_relay_layer() {
        let relay = Keypair::generate();
        let route = [
            Hop::new("relay1.onion", "pw1").sealed_to(relay.public()),
            Hop::new("relay2.example:8080", "hunter2"),
        ];
        let onion = build_onion(&route, "Hello").unwrap();
        assert_eq!(onion.entry_address, "relay1.onion");
        assert_eq!(onion.entry_password, "pw1");

        let plaintext = open_with_keypair(&relay, &onion.payload).unwrap();
        let (hop, rest) = peel(std::str::from_utf8(&plaintext).unwrap()).unwrap();
        assert_eq!(hop, HopHeader::new("relay2.example:8080", "hunter2"));
        assert_eq!(rest, "Hello");
    }

    #[test]
    fn test_peeled_in_order() {
        let keys: Vec<Keypair> = (0..3).map(|_| Keypair::generate()).collect();
        let route = vec![
            Hop::new("r0", "p0").sealed_to(keys[0].public()),
            Hop::new("r1", "p1").sealed_to(keys[1].public()),
            Hop::new("r2", "p2").sealed_to(keys[2].public()),
            Hop::new("dest", "pd"),
        ];
        let onion = build_onion(&route, "the message").unwrap();

        let mut payload = onion.payload;
        for (i, key) in keys.iter().enumerate() {
            let plaintext = String::from_utf8(open_with_keypair(key, &payload).unwrap()).unwrap();
            let (hop, rest) = peel(&plaintext).unwrap();
            assert_eq!(hop.address, route[i + 1].address);
            assert_eq!(hop.password, route[i + 1].password);
            payload = rest.into_bytes();
        }
        assert_eq!(payload, b"the message");
    }

    #[test]
    fn test_middleman_layer_is_plaintext() {
        let exit = Keypair::generate();
        let route = [
            Hop::new("mm", "p0"),
            Hop::new("exit", "p1").sealed_to(exit.public()),
            Hop::new("dest", "pd"),
        ];
        let onion = build_onion(&route, "msg").unwrap();
        let text = String::from_utf8(onion.payload).unwrap();
        assert!(text.starts_with("X-OC-To: exit p1\r\n\r\n"));

        let (_, sealed) = peel(&text).unwrap();
        let inner = open_with_keypair(&exit, sealed.as_bytes()).unwrap();
        assert_eq!(inner, b"X-OC-To: dest pd\r\n\r\nmsg");
    }

    #[test]
    fn test_keyed_destination_receives_sealed_message() {
        let relay = Keypair::generate();
        let dest = Keypair::generate();
        let route = [
            Hop::new("r1", "p1").sealed_to(relay.public()),
            Hop::new("dest", "pd").sealed_to(dest.public()),
        ];
        let onion = build_onion(&route, "top secret").unwrap();

        let layer = String::from_utf8(open_with_keypair(&relay, &onion.payload).unwrap()).unwrap();
        let (hop, forwarded) = peel(&layer).unwrap();
        assert_eq!(hop, HopHeader::new("dest", "pd"));
        assert_ne!(forwarded, "top secret");
        assert!(!forwarded.contains("top secret"));
        assert_eq!(open_with_keypair(&dest, forwarded.as_bytes()).unwrap(), b"top secret");
    }

    #[test]
    fn test_route_too_short() {
        assert!(matches!(
            build_onion(&[Hop::new("only", "pw")], "x"),
            Err(OnionError::RouteTooShort(1))
        ));
        assert!(matches!(build_onion(&[], "x"), Err(OnionError::RouteTooShort(0))));
    }
}
