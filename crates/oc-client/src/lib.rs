//! oc-client: sender side of Onion Courier
//!
//! Builds layered payloads for an explicit route, manages relay key files
//! and uploads to the first hop through Tor.

pub mod cli;
pub mod datafile;
pub mod onion;
pub mod upload;

#[cfg(test)]
mod proptests;

pub use cli::Cli;
pub use datafile::{parse_route, read_route, DataFileError, RouteEntry};
pub use onion::{build_onion, Hop, Onion, OnionError};
pub use upload::{format_elapsed, Delivery, UploadOptions, Uploader};
