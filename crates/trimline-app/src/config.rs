//! Application configuration.
//!
//! Stored as JSON with a schema version field. Missing fields take their
//! defaults, so older files keep loading as settings are added.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use trimline_core::SPEED_PRESETS;
use trimline_media::{EncodeSettings, ExportSettings, DEFAULT_OUTPUT_PREFIX};

/// Current schema version.
pub const CONFIG_VERSION: u32 = 1;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "TRIMLINE_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Schema version for migration.
    pub version: u32,
    /// Download FFmpeg on first export when it is not on PATH.
    pub auto_download_ffmpeg: bool,
    pub output_prefix: String,
    /// Delay before a delivered export result is released.
    pub result_release_grace_ms: u64,
    /// Delay before an engine that ignores cancellation is discarded.
    pub cancel_grace_ms: u64,
    pub encode: EncodeSettings,
    pub speed_presets: Vec<f64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            auto_download_ffmpeg: false,
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            result_release_grace_ms: 3000,
            cancel_grace_ms: 2000,
            encode: EncodeSettings::default(),
            speed_presets: SPEED_PRESETS.to_vec(),
        }
    }
}

impl AppConfig {
    /// `$TRIMLINE_CONFIG`, else `<config dir>/trimline/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("trimline").join("config.json"))
    }

    /// Parse a config file, rejecting versions newer than this build understands.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_slice(data).context("Invalid JSON")?;
        let version = raw.get("version").and_then(|v| v.as_u64()).unwrap_or(0);
        if version > u64::from(CONFIG_VERSION) {
            bail!(
                "Config version {version} is newer than supported version {CONFIG_VERSION}"
            );
        }

        let mut config: Self = serde_json::from_value(raw).context("Failed to parse config")?;
        config.version = CONFIG_VERSION;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).context("Failed to serialize config")
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(data) => Self::from_json(&data)
                .with_context(|| format!("Failed to load config {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read config {}", path.display())),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write config {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if let Some(bad) = self
            .speed_presets
            .iter()
            .find(|s| !s.is_finite() || **s <= 0.0)
        {
            bail!("Speed preset {bad} must be positive");
        }
        Ok(())
    }

    /// Orchestrator settings derived from this config.
    pub fn export_settings(&self) -> ExportSettings {
        ExportSettings {
            output_prefix: self.output_prefix.clone(),
            result_grace: Duration::from_millis(self.result_release_grace_ms),
            cancel_grace: Duration::from_millis(self.cancel_grace_ms),
        }
    }
}
