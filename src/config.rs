use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::playback::PlaybackConfig;
use crate::recorder::RecorderConfig;
use crate::relay::DEFAULT_REPLAY_LIMIT;

/// Prefix for environment overrides, e.g. `CHUNKCAST__HTTP__PORT=8080`
const ENV_PREFIX: &str = "CHUNKCAST";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transport: TransportConfig,
    pub recorder: RecorderConfig,
    pub playback: PlaybackConfig,
    pub relay: RelayConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub nats_url: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Where finished sessions are archived
    pub recordings_dir: PathBuf,

    /// Upper bound on the replay sent to a viewer joining mid-stream
    /// Default: 512 KiB
    pub replay_limit_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("recordings"),
            replay_limit_bytes: DEFAULT_REPLAY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 4000,
        }
    }
}

impl HttpConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl Config {
    /// Load `path` (any extension the `config` crate knows, optional) and
    /// apply `CHUNKCAST__*` environment overrides on top
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path))?;

        let config: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        config.recorder.validate().context("Invalid configuration")?;
        // Base64 grows the replay by a third and NATS caps payloads at 1 MiB
        if config.relay.replay_limit_bytes > 3 * 256 * 1024 {
            bail!(
                "Invalid configuration: relay.replay_limit_bytes must not exceed {}",
                3 * 256 * 1024
            );
        }

        Ok(config)
    }
}
