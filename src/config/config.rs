//! Clawsync settings
//! Handles loading and saving the YAML settings file

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Env var pointing at an alternate settings file
pub const CONFIG_ENV: &str = "CLAWSYNC_CONFIG";
/// Env var the agent itself honours for its state directory
pub const STATE_DIR_ENV: &str = "OPENCLAW_STATE_DIR";

/// Clawsync settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Agent state directory holding `agents/<tenant>/...`
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Database path
    #[serde(default = "default_db_path")]
    pub database_path: String,

    /// Watcher timing
    #[serde(default)]
    pub watcher: WatcherSettings,

    /// How long a platform write registration stays live
    #[serde(default = "default_suppression_window_secs")]
    pub suppression_window_secs: u64,

    /// Bound on every store call
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

fn default_state_dir() -> String {
    "~/.openclaw".to_string()
}

fn default_db_path() -> String {
    "~/.clawsync/clawsync.db".to_string()
}

fn default_suppression_window_secs() -> u64 {
    5
}

fn default_store_timeout_ms() -> u64 {
    5000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            database_path: default_db_path(),
            watcher: WatcherSettings::default(),
            suppression_window_secs: default_suppression_window_secs(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

/// Debounce and retry timing for the path watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherSettings {
    #[serde(default = "default_stability_ms")]
    pub stability_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

fn default_stability_ms() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_retry_interval_ms() -> u64 {
    2000
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            stability_ms: default_stability_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl WatcherSettings {
    pub fn stability(&self) -> Duration {
        Duration::from_millis(self.stability_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Settings {
    /// Load settings from the default location or specified path
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = Self::config_path(path)?;

        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let settings = Settings::default();
            settings.save(path)?;
            return Ok(settings);
        }

        let raw = fs::read_to_string(&config_path).context("Failed to read config file")?;
        let settings = Self::from_yaml(&raw)?;

        debug!("Loaded config from {:?}", config_path);
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("Failed to parse config file")
    }

    /// Save settings to the default location or specified path
    pub fn save(&self, path: Option<&str>) -> Result<()> {
        let config_path = Self::config_path(path)?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(&self)?;
        fs::write(&config_path, content).context("Failed to write config file")?;

        info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Get the config file path
    fn config_path(path: Option<&str>) -> Result<PathBuf> {
        // Check env override first
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(env_path));
        }

        if let Some(p) = path {
            return Ok(PathBuf::from(p));
        }

        let home = dirs::home_dir().context("Cannot find home directory")?;
        Ok(home.join(".clawsync").join("config.yml"))
    }

    /// Resolve the state directory; `OPENCLAW_STATE_DIR` wins over the file
    pub fn resolve_state_dir(&self) -> Result<PathBuf> {
        let raw = std::env::var(STATE_DIR_ENV).unwrap_or_else(|_| self.state_dir.clone());
        expand_home(&raw)
    }

    /// Resolve database path (expand ~)
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        expand_home(&self.database_path)
    }

    pub fn suppression_window(&self) -> Duration {
        Duration::from_secs(self.suppression_window_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(raw: &str) -> Result<PathBuf> {
    match raw.strip_prefix('~') {
        Some(rest) => {
            let home = dirs::home_dir().context("Cannot find home directory")?;
            Ok(home.join(rest.trim_start_matches('/')))
        }
        None => Ok(PathBuf::from(raw)),
    }
}
