//! oc-inbox: destination drop box for Onion Courier routes

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use oc_relay::{InboxConfig, InboxServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = InboxConfig::load()?;
    info!(dir = %config.dir.display(), "Starting oc-inbox");

    let server = InboxServer::new(config)?;

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
