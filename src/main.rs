mod config;
mod control;
mod core;
mod input;
mod logging;
mod playback;
mod server;
mod sink;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use config::{Args, Settings};
use playback::Journey;
use sink::ConnectionRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();

    let settings = Settings::load().apply_args(Args::parse());
    settings.validate()?;

    let track = input::load_file(&settings.track_path)
        .with_context(|| format!("Failed to load track {}", settings.track_path.display()))?;
    if track.is_empty() {
        warn!("Track {} has no usable fixes", settings.track_path.display());
    } else {
        info!(
            "Loaded {} fixes from {}",
            track.len(),
            settings.track_path.display()
        );
    }

    let (journey, task) = Journey::spawn(
        track,
        settings.playback_config(),
        ConnectionRegistry::new(settings.connection_policy),
    );

    server::serve(settings.socket_addr()?, journey).await?;
    task.await.context("Journey task panicked")?;
    Ok(())
}
