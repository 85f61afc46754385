use anyhow::{Context, Result};
use hubhq_core::status::StatusThresholds;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "HUBHQ_CONFIG";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    /// Root of the per-hub JSON snapshots.
    pub data_dir: PathBuf,
    pub outbox_dir: PathBuf,
    pub log_level: Option<String>,
    /// Thresholds given to newly registered hubs.
    pub thresholds: ThresholdConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub event_threshold: u32,
    pub inactivity_days: i64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        let defaults = StatusThresholds::default();
        Self {
            event_threshold: defaults.event_threshold,
            inactivity_days: defaults.inactivity_days,
        }
    }
}

impl From<ThresholdConfig> for StatusThresholds {
    fn from(config: ThresholdConfig) -> Self {
        Self {
            event_threshold: config.event_threshold,
            inactivity_days: config.inactivity_days,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hubhq");
        Self {
            database_path: base.join("hubhq.db"),
            data_dir: base.join("snapshots"),
            outbox_dir: base.join("outbox"),
            log_level: None,
            thresholds: ThresholdConfig::default(),
        }
    }
}

/// `--config` (or `HUBHQ_CONFIG`, which clap folds into it) wins over the
/// per-user config directory.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hubhq/config.toml")
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("Failed to parse config {}", path.display()))
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let contents = toml::to_string_pretty(config).context("Failed to render config")?;
    fs::write(path, contents).with_context(|| format!("Failed to write config {}", path.display()))
}
