//! oc-relay: Onion Courier relay binary

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use oc_relay::{RelayConfig, RelayServer};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting oc-relay");

    // Load configuration
    let config = RelayConfig::load()?;
    info!(role = %config.role, "Configuration loaded");

    let server = RelayServer::new(config)?;

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
