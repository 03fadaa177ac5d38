//! Per-request relay state machine.
//!
//! ```text
//! Received -> Authenticated -> Decrypted -> Stripped -> Forwarded -> Responded
//!     \             \               \            \            \
//!      +-------------+---------------+------------+------------+--> Rejected
//! ```
//!
//! Each request is handled on its own. The node holds only immutable state,
//! so one instance is shared by every request behind an `Arc`.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use oc_crypto::utils::passwords_match;
use oc_crypto::{open_with_keypair, Keypair};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::forwarder::{ForwardError, HopTransport};
use crate::header::HeaderError;
use crate::metrics::RelayMetrics;
use crate::strip;

/// Guard relays accept one sealed layer per upload.
pub const GUARD_MAX_PAYLOAD_BYTES: usize = 28 * 1024;
/// Middlemen receive plaintext layers, which carry the whole remaining onion.
pub const MIDDLEMAN_MAX_PAYLOAD_BYTES: usize = 42 * 1024;

const ANNOTATION_HEAD: &str =
    "File received and sent.\nNo data is stored or logged by Onion Courier.\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Holds a private key and opens one envelope per upload.
    Guard,
    /// Holds no key; uploads are already plaintext.
    Middleman,
}

impl Role {
    pub fn default_max_payload(&self) -> usize {
        match self {
            Role::Guard => GUARD_MAX_PAYLOAD_BYTES,
            Role::Middleman => MIDDLEMAN_MAX_PAYLOAD_BYTES,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guard => "guard",
            Role::Middleman => "middleman",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "guard" => Ok(Role::Guard),
            "middleman" => Ok(Role::Middleman),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("decryption failed")]
    DecryptionFailed,
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error(transparent)]
    Forward(#[from] ForwardError),
}

impl RelayError {
    /// Short label used for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            RelayError::Unauthorized => "unauthorized",
            RelayError::PayloadTooLarge { .. } => "too_large",
            RelayError::DecryptionFailed => "decryption_failed",
            RelayError::Header(HeaderError::NoHeader) => "no_header",
            RelayError::Header(HeaderError::InvalidHeader) => "invalid_header",
            RelayError::Forward(ForwardError::Status { .. }) => "downstream_status",
            RelayError::Forward(_) => "transport",
        }
    }
}

/// Settings shared by both roles.
#[derive(Clone)]
pub struct NodeSettings {
    pub password: String,
    pub max_payload_bytes: usize,
    pub annotate_responses: bool,
}

impl fmt::Debug for NodeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSettings")
            .field("password", &"[REDACTED]")
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("annotate_responses", &self.annotate_responses)
            .finish()
    }
}

enum Identity {
    Guard(Keypair),
    Middleman,
}

/// A relay: authenticates the caller, peels one layer and forwards the rest.
pub struct RelayNode {
    identity: Identity,
    settings: NodeSettings,
    transport: Arc<dyn HopTransport>,
    metrics: Arc<RelayMetrics>,
}

impl RelayNode {
    /// A guard relay. The keypair is held for the node's lifetime; the
    /// exchange secret is derived per request.
    pub fn guard(
        keypair: Keypair,
        settings: NodeSettings,
        transport: Arc<dyn HopTransport>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            identity: Identity::Guard(keypair),
            settings,
            transport,
            metrics,
        }
    }

    pub fn middleman(
        settings: NodeSettings,
        transport: Arc<dyn HopTransport>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            identity: Identity::Middleman,
            settings,
            transport,
            metrics,
        }
    }

    pub fn role(&self) -> Role {
        match self.identity {
            Identity::Guard(_) => Role::Guard,
            Identity::Middleman => Role::Middleman,
        }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.settings.max_payload_bytes
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Constant-time check of the caller's `X-Password`.
    pub fn authenticate(&self, caller_password: Option<&str>) -> Result<(), RelayError> {
        if passwords_match(caller_password, &self.settings.password) {
            Ok(())
        } else {
            Err(RelayError::Unauthorized)
        }
    }

    /// Run one upload through the node.
    pub async fn handle(
        &self,
        caller_password: Option<&str>,
        payload: Vec<u8>,
    ) -> Result<String, RelayError> {
        let result = self.process(caller_password, payload).await;
        if let Err(e) = &result {
            self.metrics.record_rejection(e.reason());
            warn!(reason = e.reason(), "Upload rejected");
        }
        result
    }

    async fn process(
        &self,
        caller_password: Option<&str>,
        payload: Vec<u8>,
    ) -> Result<String, RelayError> {
        self.metrics.record_received(payload.len());
        self.authenticate(caller_password)?;

        if payload.len() > self.settings.max_payload_bytes {
            return Err(RelayError::PayloadTooLarge {
                size: payload.len(),
                limit: self.settings.max_payload_bytes,
            });
        }
        debug!(bytes = payload.len(), role = %self.role(), "Upload authenticated");

        let plaintext = self.decrypt(payload)?;

        let (hop, stripped) = strip::peel(&plaintext)?;
        drop(plaintext);

        let forward_len = stripped.len();
        let started = Instant::now();
        let response = self.transport.forward(stripped.into_bytes(), &hop).await?;
        let elapsed = started.elapsed();
        self.metrics.record_forward(forward_len, elapsed);
        info!(
            bytes = forward_len,
            elapsed_ms = elapsed.as_millis() as u64,
            "Layer forwarded"
        );

        Ok(self.respond(response))
    }

    fn decrypt(&self, payload: Vec<u8>) -> Result<String, RelayError> {
        match &self.identity {
            Identity::Guard(keypair) => {
                // Malformed input and tag mismatch are indistinguishable to
                // the caller.
                let plaintext = open_with_keypair(keypair, &payload)
                    .map_err(|_| RelayError::DecryptionFailed)?;
                String::from_utf8(plaintext).map_err(|_| RelayError::DecryptionFailed)
            }
            Identity::Middleman => String::from_utf8(payload)
                .map_err(|_| RelayError::Header(HeaderError::InvalidHeader)),
        }
    }

    fn respond(&self, downstream: String) -> String {
        if self.settings.annotate_responses {
            format!("{ANNOTATION_HEAD}Onion Courier Response: {downstream}\n")
        } else {
            downstream
        }
    }
}

impl fmt::Debug for RelayNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayNode")
            .field("role", &self.role())
            .field("settings", &self.settings)
            .finish()
    }
}
