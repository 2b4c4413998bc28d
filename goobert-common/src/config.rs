//! Configuration loading and config file resolution
//!
//! Configuration is a plain TOML file; every field has a default so a
//! partial (or missing) file is valid. The loaded `WallConfig` is an
//! immutable snapshot handed to the orchestrator at construction.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "GOOBERT_CONFIG";

/// Application directory name under the platform config dir
const APP_DIR: &str = "goobert";

/// Complete wall configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WallConfig {
    pub grid: GridConfig,
    pub playback: PlaybackConfig,
    pub skipper: SkipperConfig,
    pub watchdog: WatchdogConfig,
    pub stats: StatsConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub default_rows: usize,
    pub default_cols: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            default_rows: 3,
            default_cols: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Volume applied to every cell when the grid starts (0-100)
    pub default_volume: u8,
    /// Step used by VolumeUp / VolumeDown
    pub volume_step: u8,
    /// Relative seek used by SeekForward / SeekBackward
    pub seek_step_seconds: f64,
    /// Seek amount offered to the engine for its own key handling
    pub seek_amount_seconds: u32,
    /// How long an image stays on screen before the engine advances
    pub image_display_duration: f64,
    /// Delay between shuffle and next for ShuffleThenNextAll
    pub shuffle_next_delay_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_volume: 30,
            volume_step: 5,
            seek_step_seconds: 5.0,
            seek_amount_seconds: 30,
            image_display_duration: 2.5,
            shuffle_next_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipperConfig {
    pub enabled: bool,
    /// Fraction of the duration to jump to on first load (0.0-1.0)
    pub skip_percent: f64,
    /// Delay after load before the jump
    pub delay_ms: u64,
}

impl Default for SkipperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_percent: 0.33,
            delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub interval_ms: u64,
    /// Minimum time a cell must be without a file before it counts as dead
    pub grace_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            grace_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub enabled: bool,
    pub flush_interval_ms: u64,
    /// Sessions shorter than this are never recorded
    pub min_session_ms: u64,
    /// `None` resolves to `<config_dir>/goobert/goobert.db`
    pub database_path: Option<PathBuf>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flush_interval_ms: 10_000,
            min_session_ms: 1000,
            database_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// `None` resolves to the platform video directory
    pub default_media_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl WallConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: WallConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;
        config.skipper.skip_percent = config.skipper.skip_percent.clamp(0.0, 1.0);
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve and load configuration
    ///
    /// Resolution order:
    /// 1. Command-line path (must exist)
    /// 2. `GOOBERT_CONFIG` environment variable (must exist)
    /// 3. `<config_dir>/goobert/goobert.toml` if present
    /// 4. Built-in defaults
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        match resolve_config_path(cli_path, env_path.as_deref(), default_config_file().as_deref()) {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject values the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.grid.default_rows == 0 || self.grid.default_cols == 0 {
            return Err(Error::Config(format!(
                "Grid dimensions must be positive, got {}x{}",
                self.grid.default_rows, self.grid.default_cols
            )));
        }
        if self.playback.default_volume > 100 {
            return Err(Error::Config(format!(
                "default_volume must be 0-100, got {}",
                self.playback.default_volume
            )));
        }
        if self.playback.volume_step > 100 {
            return Err(Error::Config(format!(
                "volume_step must be 0-100, got {}",
                self.playback.volume_step
            )));
        }
        if self.watchdog.interval_ms == 0 {
            return Err(Error::Config("watchdog.interval_ms must be non-zero".to_string()));
        }
        if self.stats.flush_interval_ms == 0 {
            return Err(Error::Config("stats.flush_interval_ms must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Database path, falling back to the platform config dir
    pub fn database_path(&self) -> PathBuf {
        self.stats
            .database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }

    /// Media path used when no source is given
    pub fn default_media_path(&self) -> PathBuf {
        self.paths
            .default_media_path
            .clone()
            .or_else(dirs::video_dir)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Pick the config file to load
///
/// Explicit paths (CLI, env) are returned even if missing so the load
/// reports the error; the default location only counts when it exists.
pub fn resolve_config_path(
    cli_path: Option<&Path>,
    env_path: Option<&Path>,
    default_path: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env_path {
        return Some(path.to_path_buf());
    }
    default_path.filter(|p| p.exists()).map(Path::to_path_buf)
}

/// `<config_dir>/goobert`
pub fn app_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
}

fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("goobert.toml"))
}

fn default_database_path() -> PathBuf {
    app_config_dir().join("goobert.db")
}
