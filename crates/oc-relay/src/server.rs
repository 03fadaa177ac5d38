//! HTTP front end of a relay: `/upload`, `/health`, `/metrics`.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection}, DefaultBodyLimit, Multipart,
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{error, info, warn, Level};

use crate::config::RelayConfig;
use crate::forwarder::{ForwardError, HttpForwarder, PASSWORD_HEADER};
use crate::metrics::RelayMetrics;
use crate::node::{RelayError, RelayNode, Role};

/// Room for multipart boundaries and part headers on top of the payload.
pub(crate) const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Relay HTTP server
pub struct RelayServer {
    config: RelayConfig,
    node: Arc<RelayNode>,
    shutdown_tx: watch::Sender<bool>,
}

impl RelayServer {
    /// Build the node described by `config`: load the key for a guard and
    /// set up the outbound forwarder.
    pub fn new(config: RelayConfig) -> Result<Self> {
        let metrics = Arc::new(RelayMetrics::new()?);
        let forwarder = Arc::new(
            HttpForwarder::new(config.proxy(), config.display_name.clone())
                .context("Failed to build forwarder")?,
        );

        let node = match config.role {
            Role::Guard => {
                let path = config
                    .private_key_path
                    .as_ref()
                    .context("guard role requires a private key file")?;
                let keypair = oc_crypto::pem::load_keypair(path)
                    .with_context(|| format!("Failed to load private key from {:?}", path))?;
                RelayNode::guard(keypair, config.node_settings(), forwarder, metrics)
            }
            Role::Middleman => RelayNode::middleman(config.node_settings(), forwarder, metrics),
        };

        Ok(Self::with_node(config, Arc::new(node)))
    }

    /// Wrap an already-built node.
    pub fn with_node(config: RelayConfig, node: Arc<RelayNode>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            node,
            shutdown_tx,
        }
    }

    pub fn node(&self) -> &Arc<RelayNode> {
        &self.node
    }

    pub fn router(&self) -> Router {
        router(self.node.clone())
    }

    /// Ask a running server to stop accepting connections.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.listen_addr))?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(
            addr = %listener.local_addr()?,
            role = %self.node.role(),
            max_payload = self.node.max_payload_bytes(),
            "Relay listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal(self.shutdown_tx.subscribe()))
            .await?;

        info!("Relay stopped");
        Ok(())
    }
}

/// Routes for one relay node.
pub fn router(node: Arc<RelayNode>) -> Router {
    let body_limit = node.max_payload_bytes().saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/upload", post(upload_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(node)
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::DEBUG)),
            ),
        )
}

async fn upload_handler(
    State(node): State<Arc<RelayNode>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let password = headers
        .get(PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // Cheap rejection before the body is read.
    if let Err(e) = node.authenticate(password.as_deref()) {
        node.metrics().record_rejection(e.reason());
        warn!(reason = e.reason(), "Upload rejected");
        return error_response(e);
    }

    let Ok(mut multipart) = multipart else {
        node.metrics().record_rejection("bad_multipart");
        return (StatusCode::BAD_REQUEST, "Error retrieving the file").into_response();
    };

    let payload = match read_file_field(&mut multipart).await {
        Ok(Some(payload)) => payload,
        Ok(None) => {
            node.metrics().record_rejection("missing_file");
            return (StatusCode::BAD_REQUEST, "Error retrieving the file").into_response();
        }
        Err(e) => {
            let status = e.status();
            if status == StatusCode::PAYLOAD_TOO_LARGE {
                node.metrics().record_rejection("too_large");
                return (status, "Payload too large").into_response();
            }
            node.metrics().record_rejection("bad_multipart");
            return (StatusCode::BAD_REQUEST, "Error retrieving the file").into_response();
        }
    };

    // The node runs detached, so a caller hanging up does not abort an
    // in-flight forward halfway.
    let task = tokio::spawn(async move { node.handle(password.as_deref(), payload).await });
    match task.await {
        Ok(Ok(body)) => (StatusCode::OK, body).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => {
            error!("Relay task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Option<Vec<u8>>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            return Ok(Some(field.bytes().await?.to_vec()));
        }
    }
    Ok(None)
}

/// Map a relay outcome to the HTTP reply seen by the previous hop.
pub fn error_response(err: RelayError) -> Response {
    match err {
        RelayError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
        RelayError::PayloadTooLarge { .. } => {
            (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large").into_response()
        }
        RelayError::DecryptionFailed => {
            (StatusCode::BAD_REQUEST, "Decryption failed").into_response()
        }
        RelayError::Header(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        RelayError::Forward(ForwardError::Status { status, body }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, body).into_response()
        }
        RelayError::Forward(_) => {
            (StatusCode::BAD_GATEWAY, "Error forwarding the file").into_response()
        }
    }
}

/// Health check handler
async fn health_handler() -> StatusCode {
    StatusCode::OK
}

/// Metrics export handler
async fn metrics_handler(State(node): State<Arc<RelayNode>>) -> Result<Response<String>, StatusCode> {
    match node.metrics().export() {
        Ok(body) => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(body)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub(crate) async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = sigterm => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, starting graceful shutdown");
        }
        _ = async {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    return;
                }
            }
            std::future::pending::<()>().await
        } => {
            info!("Shutdown requested");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderError;

    fn status_of(err: RelayError) -> StatusCode {
        error_response(err).status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(RelayError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(RelayError::PayloadTooLarge { size: 2, limit: 1 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(status_of(RelayError::DecryptionFailed), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(RelayError::Header(HeaderError::NoHeader)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(RelayError::Forward(ForwardError::Status {
                status: 418,
                body: String::new()
            })),
            StatusCode::IM_A_TEAPOT
        );
        assert_eq!(
            status_of(RelayError::Forward(ForwardError::Client("x".into()))),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_router_accepts_largest_limit() {
        use crate::node::NodeSettings;

        let node = RelayNode::middleman(
            NodeSettings {
                password: "pw".into(),
                max_payload_bytes: usize::MAX,
                annotate_responses: false,
            },
            Arc::new(HttpForwarder::new(None, None).unwrap()),
            Arc::new(RelayMetrics::new().unwrap()),
        );
        let _ = router(Arc::new(node));
    }
}
