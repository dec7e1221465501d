//! Engine configuration loaded from `<config dir>/tonegrid/engine.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tonegrid_core::SchedulerConfig;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scheduling: SchedulerConfig,
    #[serde(default)]
    pub playhead: PlayheadConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayheadConfig {
    /// Smallest tempo multiplier change worth reporting
    pub tempo_epsilon: f64,
    /// A marker counts as passed once the playhead is this close, in pixels
    pub marker_pass_epsilon_px: f64,
    /// Non-looping playback stops this close to the end, in seconds
    pub end_tolerance: f64,
}

impl Default for PlayheadConfig {
    fn default() -> Self {
        Self {
            tempo_epsilon: 1e-4,
            marker_pass_epsilon_px: 0.5,
            end_tolerance: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub start_latency_secs: f64,
    pub loop_epsilon: f64,
    pub notification_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            start_latency_secs: 0.1,
            loop_epsilon: 1e-4,
            notification_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tonegrid")
        .join("engine.toml")
}

/// Load the user config, falling back to defaults
pub fn load_config() -> EngineConfig {
    let path = config_path();
    match EngineConfig::load_from(&path) {
        Ok(config) => {
            debug!(path = %path.display(), "Loaded engine config");
            config
        }
        Err(ConfigError::Io(_)) => EngineConfig::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring invalid engine config");
            EngineConfig::default()
        }
    }
}
