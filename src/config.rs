use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// The one media file both the player and the recorder are bound to
    #[serde(default = "default_resource")]
    pub resource: PathBuf,

    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    #[serde(default = "default_seek_debounce_ms")]
    pub seek_debounce_ms: u64,

    #[serde(default)]
    pub require_record_permission: bool,

    #[serde(default)]
    pub looping: bool,

    #[serde(default = "default_status_format")]
    pub status_format: String,
}

fn default_resource() -> PathBuf {
    let data_dir = if let Ok(dir) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(dir)
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local").join("share")
    } else {
        PathBuf::from(".")
    };
    data_dir.join("voux").join("take.wav")
}

fn default_progress_interval_ms() -> u64 {
    100
}

fn default_seek_debounce_ms() -> u64 {
    200
}

fn default_status_format() -> String {
    "text".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resource: default_resource(),
            progress_interval_ms: default_progress_interval_ms(),
            seek_debounce_ms: default_seek_debounce_ms(),
            require_record_permission: false,
            looping: false,
            status_format: default_status_format(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.config/voux/config.json)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`, writing a default config there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("Config file not found at {:?}, creating default config", path);
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(dir)
        } else {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".config")
        };

        Ok(config_dir.join("voux").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.resource.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("resource cannot be empty"));
        }

        if self.progress_interval_ms == 0 {
            return Err(anyhow::anyhow!("progress_interval_ms must be greater than 0"));
        }

        if self.seek_debounce_ms == 0 {
            return Err(anyhow::anyhow!("seek_debounce_ms must be greater than 0"));
        }

        if !["text", "json"].contains(&self.status_format.as_str()) {
            return Err(anyhow::anyhow!("status_format must be one of: text, json"));
        }

        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn seek_debounce(&self) -> Duration {
        Duration::from_millis(self.seek_debounce_ms)
    }
}
