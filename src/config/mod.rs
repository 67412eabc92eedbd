//! Configuration module for canvis-rs
//!
//! This module holds the tunables of the three workers and the coordinator,
//! plus logging options for the binary.
//!
//! # Config Location
//!
//! The configuration is stored as TOML in the platform-appropriate config
//! directory under `canvis-rs`:
//!
//! - **Linux**: `~/.config/canvis-rs/config.toml`
//! - **macOS**: `~/Library/Application Support/canvis-rs/config.toml`
//! - **Windows**: `%APPDATA%\canvis-rs\config.toml`
//!
//! Every section and field is optional in the file; missing values take the
//! defaults below.
//!
//! # Example
//!
//! ```ignore
//! use canvis_rs::config::AppConfig;
//!
//! let mut config = AppConfig::load_or_default();
//! config.pipeline.batch_size = 100;
//! config.save("canvis.toml")?;
//! ```

use crate::error::{CanVisError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "canvis-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Default number of frames drained per batch cycle
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default debounce window in milliseconds
pub const DEFAULT_BATCH_WINDOW_MS: u64 = 20;

/// Default retained buffer size
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 10_000;

/// Default search cache capacity
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Default shutdown wait per coordinator in milliseconds
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Ingestion pipeline tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum frames drained per cycle; reaching it fires a cycle at once
    pub batch_size: usize,
    /// Debounce window before a cycle runs
    pub batch_window_ms: u64,
    /// Delay before a follow-up cycle when backlog remains
    pub follow_up_ms: u64,
    /// Maximum frames retained for filter re-scans
    pub max_buffer_size: usize,
    /// Statistics window length
    pub stats_window_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_window_ms: DEFAULT_BATCH_WINDOW_MS,
            follow_up_ms: 1,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            stats_window_ms: 1_000,
        }
    }
}

impl PipelineConfig {
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    pub fn follow_up(&self) -> Duration {
        Duration::from_millis(self.follow_up_ms)
    }

    pub fn stats_window(&self) -> Duration {
        Duration::from_millis(self.stats_window_ms.max(1))
    }
}

/// Catalog search tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Cached result lists kept before the oldest is evicted
    pub cache_capacity: usize,
    /// Progress event spacing while scanning messages
    pub message_progress_every: usize,
    /// Progress event spacing while scanning signals and value tables
    pub signal_progress_every: usize,
    /// Result limit used by callers that do not pick one
    pub default_max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            message_progress_every: 10,
            signal_progress_every: 20,
            default_max_results: 100,
        }
    }
}

/// Transmit composer tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmitConfig {
    /// Feed transmitted frames back into the ingestion pipeline as TX
    pub echo_transmitted: bool,
    /// Shortest accepted periodic interval
    pub min_interval_ms: u64,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            echo_transmitted: true,
            min_interval_ms: 1,
        }
    }
}

/// Worker lifecycle and channel sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// How long shutdown waits for the workers
    pub shutdown_timeout_ms: u64,
    /// Capacity of the event channel toward the display layer
    pub event_capacity: usize,
    /// Capacity of each worker's command channel
    pub command_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            event_capacity: 10_000,
            command_capacity: 256,
        }
    }
}

impl CoordinatorConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Logging options for the binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Directory for daily-rolling log files
    pub file: Option<PathBuf>,
    /// Use the compact formatter
    pub compact: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info,canvis_rs=debug".to_string(),
            file: None,
            compact: false,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub search: SearchConfig,
    pub transmit: TransmitConfig,
    pub coordinator: CoordinatorConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Load a config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(CanVisError::from)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: AppConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        match default_config_path() {
            Some(path) if path.exists() => match Self::load(&path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to load config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }

    /// Save the config as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Reject settings the workers cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            return Err(CanVisError::Config("pipeline.batch_size must be > 0".into()));
        }
        if self.pipeline.max_buffer_size == 0 {
            return Err(CanVisError::Config(
                "pipeline.max_buffer_size must be > 0".into(),
            ));
        }
        if self.search.cache_capacity == 0 {
            return Err(CanVisError::Config("search.cache_capacity must be > 0".into()));
        }
        if self.search.message_progress_every == 0 || self.search.signal_progress_every == 0 {
            return Err(CanVisError::Config(
                "search progress spacing must be > 0".into(),
            ));
        }
        if self.coordinator.event_capacity == 0 || self.coordinator.command_capacity == 0 {
            return Err(CanVisError::Config("channel capacities must be > 0".into()));
        }
        Ok(())
    }
}
