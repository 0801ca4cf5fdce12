//! Clawsync - keeps a multi-tenant store in step with on-disk agent state

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clawsync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Clawsync v{}", env!("CARGO_PKG_VERSION"));

    clawsync::cli::run()?;

    Ok(())
}
