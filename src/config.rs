use anyhow::{bail, Context, Result};
use dirs::config_dir;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::watcher::WatchTarget;

/// Main configuration structure for autosync
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// What to watch and how to identify this machine
    #[serde(default)]
    pub watch: WatchConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Watch target configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Directory to watch; must be inside a git working tree
    #[serde(default = "default_path")]
    pub path: String,

    /// Device name embedded in commit messages
    #[serde(default = "default_device")]
    pub device: String,

    /// Watch subdirectories as well as the top-level directory
    #[serde(default)]
    pub recursive: bool,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Quiet window after an accepted change during which further changes are ignored
    #[serde(default = "default_quiet_window")]
    pub quiet_window: String, // "5s"

    /// git executable to invoke
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default)]
    pub level: LogLevel,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

/// Log verbosity accepted on the command line and in the config file
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    #[default]
    Off,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

/// Console log layout
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Json,
}

// Default value functions
fn default_path() -> String {
    ".".to_string()
}
fn default_device() -> String {
    "my-device".to_string()
}
fn default_quiet_window() -> String {
    "5s".to_string()
}
fn default_git_binary() -> String {
    "git".to_string()
}
fn default_true() -> bool {
    true
}

// Default implementations
impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            device: default_device(),
            recursive: false,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            quiet_window: default_quiet_window(),
            git_binary: default_git_binary(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            color: default_true(),
        }
    }
}

/// Values given on the command line; each one that is set wins over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub path: Option<String>,
    pub device: Option<String>,
    pub level: Option<LogLevel>,
}

impl Config {
    /// Load configuration from the default location if it exists, otherwise use defaults
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("autosync").join("config.yml"))
    }

    /// Apply command-line values on top of the loaded file
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(path) = overrides.path {
            self.watch.path = path;
        }
        if let Some(device) = overrides.device {
            self.watch.device = device;
        }
        if let Some(level) = overrides.level {
            self.logging.level = level;
        }
    }

    /// Expand environment variables and `~` in the watch path, then normalise it
    pub fn expand_paths(&mut self) -> Result<()> {
        let expanded = shellexpand::full(&self.watch.path)
            .context("Failed to expand watch path")?
            .into_owned();

        self.watch.path = PathBuf::from(expanded)
            .clean()
            .to_string_lossy()
            .into_owned();

        Ok(())
    }

    /// Parsed quiet window
    pub fn quiet_window(&self) -> Result<Duration> {
        parse_duration(&self.sync.quiet_window)
            .with_context(|| format!("Invalid sync.quiet_window: {:?}", self.sync.quiet_window))
    }

    /// The directory and device this process synchronizes
    pub fn watch_target(&self) -> Result<WatchTarget> {
        if self.watch.device.trim().is_empty() {
            bail!("watch.device must not be empty");
        }
        Ok(WatchTarget::new(&self.watch.path, &self.watch.device))
    }
}

/// Parse duration strings like "5s", "30m", "1h", "2d" or raw seconds
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let duration_str = duration_str.trim().to_lowercase();

    let seconds = if let Some(value) = duration_str.strip_suffix("ms") {
        return value
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .context("Invalid milliseconds value");
    } else if let Some(value) = duration_str.strip_suffix('s') {
        value.trim().parse::<u64>().context("Invalid seconds value")?
    } else if let Some(value) = duration_str.strip_suffix('m') {
        scaled(value, 60).context("Invalid minutes value")?
    } else if let Some(value) = duration_str.strip_suffix('h') {
        scaled(value, 3600).context("Invalid hours value")?
    } else if let Some(value) = duration_str.strip_suffix('d') {
        scaled(value, 86400).context("Invalid days value")?
    } else {
        duration_str
            .parse::<u64>()
            .context("Invalid duration format. Use format like '5s', '1m', '1h'")?
    };

    Ok(Duration::from_secs(seconds))
}

fn scaled(value: &str, seconds_per_unit: u64) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()?
        .checked_mul(seconds_per_unit)
        .context("duration too large")
}
