use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use crate::playback::{wait_duration, PlaybackConfig};
use crate::sink::ConnectionPolicy;

/// Command-line arguments; each one given overrides the settings file
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Track file to replay (NMEA log or CSV)
    pub track: Option<PathBuf>,
    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,
    /// Address to bind
    #[arg(long)]
    pub bind: Option<String>,
    /// Default replay speed in fixes per second
    #[arg(long)]
    pub speed: Option<f64>,
    /// Default start delay in seconds
    #[arg(long)]
    pub delay: Option<f64>,
    /// Broadcast to every client instead of only the newest
    #[arg(long)]
    pub fan_out: bool,
}

/// Server settings, read from `<config dir>/gps-replay/settings.json`
///
/// Every field is optional in the file. Command-line arguments override it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_address: String,
    pub port: u16,
    pub track_path: PathBuf,
    pub default_speed: f64,
    pub default_delay_seconds: f64,
    pub connection_policy: ConnectionPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            track_path: PathBuf::from("./leixoes_campanha.txt"),
            default_speed: 1.0,
            default_delay_seconds: 0.0,
            connection_policy: ConnectionPolicy::EvictPrevious,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gps-replay").join("settings.json"))
    }

    /// Load settings from the config file, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|contents| Self::from_json(&contents))
        {
            Ok(settings) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Ignoring settings file {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Malformed settings JSON")
    }

    /// Apply command-line overrides on top of the file settings
    pub fn apply_args(mut self, args: Args) -> Self {
        if let Some(track) = args.track {
            self.track_path = track;
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(bind) = args.bind {
            self.bind_address = bind;
        }
        if let Some(speed) = args.speed {
            self.default_speed = speed;
        }
        if let Some(delay) = args.delay {
            self.default_delay_seconds = delay;
        }
        if args.fan_out {
            self.connection_policy = ConnectionPolicy::FanOut;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.default_speed.is_finite()
            || self.default_speed <= 0.0
            || wait_duration(1.0 / self.default_speed).is_none()
        {
            bail!("default_speed must be a positive number, got {}", self.default_speed);
        }
        if wait_duration(self.default_delay_seconds).is_none() {
            bail!(
                "default_delay_seconds must be between 0 and one week, got {}",
                self.default_delay_seconds
            );
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .with_context(|| format!("Invalid bind address {:?}", self.bind_address))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            speed: self.default_speed,
            start_delay_seconds: self.default_delay_seconds,
        }
    }
}
