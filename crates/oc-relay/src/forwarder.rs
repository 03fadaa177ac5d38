//! Delivery of a stripped layer to the next hop.
//!
//! Every hop speaks the same upload call: `POST http://<address>/upload`
//! with a multipart body holding one file field named `file`, and the hop
//! password in `X-Password`. Calls leave through a SOCKS5 proxy with remote
//! name resolution, so `.onion` addresses are resolved by Tor.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use tracing::debug;

use crate::header::HopHeader;

pub const DEFAULT_PROXY_URL: &str = "socks5h://127.0.0.1:9050";
pub const FORWARD_FILE_NAME: &str = "message.txt";
pub const PASSWORD_HEADER: &str = "X-Password";
pub const USERNAME_HEADER: &str = "X-Username";

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("failed to build http client: {0}")]
    Client(String),
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("next hop returned status {status}")]
    Status { status: u16, body: String },
}

/// Something that can carry a payload to the next hop and bring back its
/// response.
#[async_trait]
pub trait HopTransport: Send + Sync {
    async fn forward(&self, payload: Vec<u8>, hop: &HopHeader) -> Result<String, ForwardError>;
}

/// `http://<address>/upload`, keeping an explicit scheme if one is given.
pub fn upload_url(address: &str) -> String {
    let base = if address.starts_with("http://") || address.starts_with("https://") {
        address.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", address.trim_end_matches('/'))
    };
    format!("{base}/upload")
}

/// Upload client over HTTP, optionally through a proxy.
#[derive(Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    display_name: Option<String>,
}

impl HttpForwarder {
    /// Build a forwarder. `proxy_url` of `None` connects directly, which is
    /// only useful for tests and local chains.
    pub fn new(proxy_url: Option<&str>, display_name: Option<String>) -> Result<Self, ForwardError> {
        let mut builder = reqwest::Client::builder().use_rustls_tls();
        builder = match proxy_url {
            Some(url) => builder.proxy(
                reqwest::Proxy::all(url).map_err(|e| ForwardError::Client(e.to_string()))?,
            ),
            None => builder.no_proxy(),
        };
        let client = builder
            .build()
            .map_err(|e| ForwardError::Client(e.to_string()))?;

        Ok(Self {
            client,
            display_name: display_name.filter(|n| !n.is_empty()),
        })
    }

    /// Upload `payload` as a file called `file_name` to `address`.
    pub async fn upload(
        &self,
        address: &str,
        password: &str,
        file_name: &str,
        payload: Vec<u8>,
    ) -> Result<String, ForwardError> {
        let size = payload.len();
        let part = Part::bytes(payload)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| ForwardError::Transport(e.without_url()))?;
        let form = Form::new().part("file", part);

        let mut request = self
            .client
            .post(upload_url(address))
            .header(PASSWORD_HEADER, password)
            .multipart(form);
        if let Some(name) = &self.display_name {
            request = request.header(USERNAME_HEADER, name);
        }

        debug!(bytes = size, "Uploading to next hop");
        let response = request
            .send()
            .await
            .map_err(|e| ForwardError::Transport(e.without_url()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ForwardError::Transport(e.without_url()))?;

        if status == StatusCode::OK {
            Ok(body)
        } else {
            Err(ForwardError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl HopTransport for HttpForwarder {
    async fn forward(&self, payload: Vec<u8>, hop: &HopHeader) -> Result<String, ForwardError> {
        self.upload(&hop.address, &hop.password, FORWARD_FILE_NAME, payload)
            .await
    }
}
