//! Client-side upload to the first hop.

use std::time::{Duration, Instant};

use oc_relay::forwarder::{HttpForwarder, DEFAULT_PROXY_URL};
use oc_relay::ForwardError;
use tracing::info;

/// Upload options taken from the command line.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// `None` connects directly.
    pub proxy_url: Option<String>,
    pub display_name: Option<String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            proxy_url: Some(DEFAULT_PROXY_URL.to_string()),
            display_name: None,
        }
    }
}

/// Result of a successful upload.
#[derive(Debug)]
pub struct Delivery {
    pub response: String,
    pub elapsed: Duration,
}

pub struct Uploader {
    forwarder: HttpForwarder,
}

impl Uploader {
    pub fn new(options: &UploadOptions) -> Result<Self, ForwardError> {
        let forwarder =
            HttpForwarder::new(options.proxy_url.as_deref(), options.display_name.clone())?;
        Ok(Self { forwarder })
    }

    pub async fn send(
        &self,
        address: &str,
        password: &str,
        file_name: &str,
        payload: Vec<u8>,
    ) -> Result<Delivery, ForwardError> {
        let started = Instant::now();
        let bytes = payload.len();
        let response = self
            .forwarder
            .upload(address, password, file_name, payload)
            .await?;
        let elapsed = started.elapsed();
        info!(bytes, elapsed_ms = elapsed.as_millis() as u64, "Upload accepted");
        Ok(Delivery { response, elapsed })
    }
}

/// Whole seconds, spelled out: `"1 hours 2 minutes 3 seconds"`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = (elapsed.as_millis() + 500) / 1000;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h} hours {m} minutes {s} seconds")
    } else if m > 0 {
        format!("{m} minutes {s} seconds")
    } else {
        format!("{s} seconds")
    }
}
