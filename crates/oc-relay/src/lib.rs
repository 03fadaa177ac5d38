//! oc-relay: Onion Courier relay node
//!
//! A relay authenticates the previous hop, opens one envelope layer, reads
//! the routing header, strips it and uploads the remainder to the next hop
//! through Tor. Nothing about a message outlives the request that carried it.
//!
//! The [`inbox`] module is the drop box at the end of a route, the only hop
//! that keeps what it receives.

pub mod config;
pub mod forwarder;
pub mod header;
pub mod inbox;
pub mod metrics;
pub mod node;
pub mod server;
pub mod strip;

#[cfg(test)]
mod proptests;

pub use config::{ConfigError, RelayConfig};
pub use forwarder::{ForwardError, HopTransport, HttpForwarder};
pub use header::{HeaderError, HopHeader};
pub use inbox::{Inbox, InboxConfig, InboxError, InboxServer, Receipt};
pub use metrics::RelayMetrics;
pub use node::{NodeSettings, RelayError, RelayNode, Role};
pub use server::RelayServer;
pub use strip::{peel, split, LineEnding, RelayMessage};
