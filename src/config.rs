//! Configuration for the worker and its host service.
//!
//! The cache bucket name lives in exactly one place, [`WorkerConfig::cache_name`],
//! and is handed to every handler through the shared worker config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clock::NotifyZone;
use crate::error::{Error, Result};

/// Default cache bucket name.
pub const DEFAULT_CACHE_NAME: &str = "mlb-tracker-v1";

/// Default path of the standings data document.
pub const DEFAULT_DATA_PATH: &str = "/data.json";

/// Default icon shown on notifications and the explore action.
pub const DEFAULT_ICON: &str = "https://cdn-icons-png.flaticon.com/512/33/33736.png";

/// Default icon shown on the close action.
pub const DEFAULT_CLOSE_ICON: &str = "https://cdn-icons-png.flaticon.com/512/458/458594.png";

/// Configuration shared by every event handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Name of the single cache bucket.
    pub cache_name: String,
    /// Paths fetched and cached on install.
    pub precache: Vec<String>,
    /// Path of the data document refreshed on sync.
    pub data_path: String,
    /// URL opened when a notification is activated.
    pub app_url: String,
    /// Zone in which `notify_hour` is evaluated.
    pub notify_zone: NotifyZone,
    /// Hour (0-23) at which a completed sync also shows the daily notification.
    pub notify_hour: u32,
    /// Notification icon and badge.
    pub icon: String,
    /// Icon of the close action.
    pub close_icon: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            precache: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                DEFAULT_DATA_PATH.to_string(),
            ],
            data_path: DEFAULT_DATA_PATH.to_string(),
            app_url: "/".to_string(),
            notify_zone: NotifyZone::Local,
            notify_hour: 7,
            icon: DEFAULT_ICON.to_string(),
            close_icon: DEFAULT_CLOSE_ICON.to_string(),
        }
    }
}

impl WorkerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache bucket name.
    #[must_use]
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Sets the zone used for the daily notification check.
    #[must_use]
    pub const fn with_notify_zone(mut self, zone: NotifyZone) -> Self {
        self.notify_zone = zone;
        self
    }

    /// Sets the hour at which the daily notification is shown.
    #[must_use]
    pub const fn with_notify_hour(mut self, hour: u32) -> Self {
        self.notify_hour = hour;
        self
    }

    /// Checks the values that would otherwise fail silently at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty cache name or an hour above 23.
    pub fn validate(&self) -> Result<()> {
        if self.cache_name.trim().is_empty() {
            return Err(Error::Config("cache_name must not be empty".to_string()));
        }
        if self.notify_hour > 23 {
            return Err(Error::Config(format!(
                "notify_hour must be 0-23, got {}",
                self.notify_hour
            )));
        }
        if !self.precache.iter().any(|p| p == &self.data_path) {
            log::warn!(
                "data_path {} is not in the precache list; it will only be cached after a sync",
                self.data_path
            );
        }
        Ok(())
    }
}

/// Upstream origin the worker fetches from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL that relative request paths resolve against.
    pub origin: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Where cached responses are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Persist buckets to disk instead of keeping them in memory.
    pub persistent: bool,
    /// Root directory for persisted buckets.
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            persistent: true,
            dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("wildcard-worker"),
        }
    }
}

/// Host service bind configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Seconds between emulated periodic syncs; `0` disables them.
    pub periodic_sync_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            periodic_sync_secs: 0,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Handler configuration.
    pub worker: WorkerConfig,
    /// Upstream configuration.
    pub network: NetworkConfig,
    /// Cache storage configuration.
    pub cache: CacheConfig,
    /// Host service configuration.
    pub api: ApiConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the config file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wildcard-worker")
            .join("config.toml")
    }

    /// Loads the config at `path`, writing the default template first if the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, written or parsed, or if
    /// the parsed values fail validation.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            log::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }
        Self::load(path)
    }

    /// Loads and validates the config at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.worker.validate()?;
        Ok(config)
    }

    /// Saves the config atomically (write tmp + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, toml::to_string_pretty(self)?)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
