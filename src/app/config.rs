use crate::download::format::DEFAULT_QUALITY;
use crate::download::manager::DEFAULT_MAX_CONCURRENT;
use crate::download::runner::{ToolSettings, DEFAULT_EXECUTABLE, DEFAULT_PROBE_TIMEOUT};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration (saved to <config_dir>/settings.toml)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub tool: ToolConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub default_directory: PathBuf,
    pub max_concurrent: usize,
    pub default_quality: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            default_directory: crate::util::paths::resolve_default_download_directory(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            default_quality: DEFAULT_QUALITY.to_string(),
        }
    }
}

/// External downloader settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub executable: PathBuf,
    pub probe_timeout_secs: u64,
    /// Extra arguments passed on every run (e.g. cookies, rate limits)
    pub extra_args: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs(),
            extra_args: Vec::new(),
        }
    }
}

impl ToolConfig {
    pub fn to_settings(&self) -> ToolSettings {
        ToolSettings {
            executable: self.executable.clone(),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs.max(1)),
            extra_args: self.extra_args.clone(),
        }
    }
}

impl Config {
    /// Load from the resolved config directory; a missing file yields defaults
    pub fn load() -> anyhow::Result<Self> {
        let config_path = crate::util::paths::get_app_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = crate::util::paths::get_app_config_path()?;
        self.save_to(&config_path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("Config not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context(format!("Failed to read {:?}", path))?;
        let config: Config = toml::from_str(&content).context(format!("Failed to parse {:?}", path))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;

        // Atomic write using temp file + rename
        let temp_path = path.with_extension("toml.tmp");
        std::fs::write(&temp_path, &content).context("Failed to write temp config file")?;
        std::fs::rename(&temp_path, path).context("Failed to rename temp config file")?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
