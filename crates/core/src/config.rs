use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use stem_transport::{DEFAULT_ENVELOPE_LEN, StemId};

use crate::progress::ProgressPolicy;

pub const SERVER_ENV: &str = "STEM_PLAYER_SERVER";

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub progress: ProgressPolicy,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 300,
            poll_interval_ms: 1000,
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub stems: Vec<StemId>,
    pub waveform_buckets: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            stems: StemId::ALL.to_vec(),
            waveform_buckets: DEFAULT_ENVELOPE_LEN,
        }
    }
}

impl Config {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("stem-player").join("config.toml"))
    }

    /// Load from the user config directory, then apply environment overrides.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };
        config.apply_env(std::env::var(SERVER_ENV).ok());
        config
    }

    /// Missing file gives the defaults; an unparsable one is logged and also gives the defaults.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                log::warn!("ignoring {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env(&mut self, server: Option<String>) {
        if let Some(url) = server.filter(|url| !url.trim().is_empty()) {
            self.server.base_url = url.trim().to_string();
        }
    }
}
