mod app;
mod audio;
mod config;
mod hooks;
mod messages;
mod mixer;
mod player;
mod presenter;
mod sequencer;
mod services;
mod song;
mod watcher;

use app::App;
use config::Config;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting tapedeck");

    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    App::new(&config).run().await?;

    tracing::info!("tapedeck shutdown complete");
    Ok(())
}
