//! TOML Configuration File Support
//!
//! Configuration for the status command, read from
//! `$XDG_CONFIG_HOME/swaybar-status/config.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (applied by the binary through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! A missing file is not an error; defaults are used.
//!
//! # Example Configuration
//!
//! ```toml
//! [bar]
//! click_events = true
//!
//! [runtime]
//! click_queue_capacity = 16
//! shutdown_grace_ms = 2000
//!
//! [clock]
//! format = "%a %b %-d, %Y %-I:%M%p"
//! short_format = "%-I:%M%p"
//!
//! [battery]
//! device = "BAT0"
//! urgent_below = 15
//!
//! [network]
//! ignore = ["lo", "docker0"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Configuration Sections
// =============================================================================

/// `[bar]`: header sent to the bar
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BarConfig {
    /// Ask the bar to send click events
    pub click_events: bool,
    /// Signal the bar sends to resume us (0 = bar default)
    pub cont_signal: i32,
    /// Signal the bar sends to pause us (0 = bar default)
    pub stop_signal: i32,
}

impl Default for BarConfig {
    fn default() -> Self {
        Self {
            click_events: true,
            cont_signal: 0,
            stop_signal: 0,
        }
    }
}

/// `[runtime]`: task plumbing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Click events buffered between the input reader and the aggregator
    pub click_queue_capacity: usize,
    /// How long shutdown waits before reporting stuck tasks
    pub shutdown_grace_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            click_queue_capacity: 16,
            shutdown_grace_ms: 2000,
        }
    }
}

impl RuntimeConfig {
    /// Shutdown grace period as a duration
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// `[clock]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    /// Whether the clock block is shown
    pub enabled: bool,
    /// strftime format of the full text
    pub format: String,
    /// strftime format shown after a click
    pub short_format: String,
    /// Refresh interval
    pub interval_secs: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: "%a %b %-d, %Y %-I:%M%p".to_string(),
            short_format: "%-I:%M%p".to_string(),
            interval_secs: 1,
        }
    }
}

/// `[battery]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryConfig {
    /// Whether the battery block is shown
    pub enabled: bool,
    /// Device name under `/sys/class/power_supply`
    pub device: String,
    /// Refresh interval
    pub interval_secs: u64,
    /// Capacity (percent) below which the block is marked urgent
    pub urgent_below: u8,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: "BAT0".to_string(),
            interval_secs: 10,
            urgent_below: 15,
        }
    }
}

/// `[network]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Whether network blocks are shown
    pub enabled: bool,
    /// Rescan interval
    pub interval_secs: u64,
    /// Interfaces never shown
    pub ignore: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
            ignore: vec!["lo".to_string()],
        }
    }
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Complete configuration of a status bar run
///
/// Serializes back to the same TOML layout, which is what `--check-config`
/// prints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatusConfig {
    /// Header sent to the bar
    pub bar: BarConfig,
    /// Task plumbing
    pub runtime: RuntimeConfig,
    /// Clock block
    pub clock: ClockConfig,
    /// Battery block
    pub battery: BatteryConfig,
    /// Network blocks
    pub network: NetworkConfig,

    /// Path to the config file that was loaded (if any)
    #[serde(skip)]
    pub config_file_path: Option<PathBuf>,

    #[serde(skip)]
    source: ConfigSource,
}

impl StatusConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the highest-priority source that set a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationError` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.click_queue_capacity == 0 {
            return Err(invalid("runtime.click_queue_capacity must be at least 1"));
        }
        if self.runtime.shutdown_grace_ms == 0 {
            return Err(invalid("runtime.shutdown_grace_ms must be at least 1"));
        }
        if self.clock.interval_secs == 0 {
            return Err(invalid("clock.interval_secs must be at least 1"));
        }
        if self.clock.format.trim().is_empty() {
            return Err(invalid("clock.format must not be empty"));
        }
        if self.battery.interval_secs == 0 {
            return Err(invalid("battery.interval_secs must be at least 1"));
        }
        if self.battery.urgent_below > 100 {
            return Err(invalid("battery.urgent_below must be at most 100"));
        }
        if self.battery.device.is_empty() || self.battery.device.contains('/') {
            return Err(invalid("battery.device must be a plain device name"));
        }
        if self.network.interval_secs == 0 {
            return Err(invalid("network.interval_secs must be at least 1"));
        }
        Ok(())
    }

    /// Render as TOML
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/swaybar-status/config.toml` or
/// `~/.config/swaybar-status/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("swaybar-status").join("config.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// result does not validate.
pub fn load_config() -> Result<StatusConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// if the result does not validate.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<StatusConfig, ConfigError> {
    load_config_with_env(path.as_deref(), |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<&Path>, env: F) -> Result<StatusConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(config_path) if config_path.exists() => {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.to_path_buf(),
                    source: e,
                })?;

            let mut config: StatusConfig = toml::from_str(&toml_content)?;
            config.config_file_path = Some(config_path.to_path_buf());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
            config
        }
        Some(config_path) => {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
            StatusConfig::default()
        }
        None => StatusConfig::default(),
    };

    // Environment overrides file values
    apply_env_config(&mut config, env);

    config.validate()?;
    Ok(config)
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut StatusConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(enabled) = env("SWAYBAR_STATUS_CLICK_EVENTS") {
        config.bar.click_events = enabled != "0" && enabled.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
    if let Some(grace) = env("SWAYBAR_STATUS_SHUTDOWN_GRACE_MS") {
        if let Ok(ms) = grace.parse::<u64>() {
            config.runtime.shutdown_grace_ms = ms;
            config.source = ConfigSource::Env;
        } else {
            tracing::warn!(value = %grace, "Ignoring unparseable SWAYBAR_STATUS_SHUTDOWN_GRACE_MS");
        }
    }
    if let Some(format) = env("SWAYBAR_STATUS_CLOCK_FORMAT") {
        config.clock.format = format;
        config.source = ConfigSource::Env;
    }
    if let Some(device) = env("SWAYBAR_STATUS_BATTERY_DEVICE") {
        config.battery.device = device;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Click events override
    pub click_events: Option<bool>,

    /// Shutdown grace override (milliseconds)
    pub shutdown_grace_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set click events override
    #[must_use]
    pub fn with_click_events(mut self, enabled: bool) -> Self {
        self.click_events = Some(enabled);
        self
    }

    /// Set shutdown grace override
    #[must_use]
    pub fn with_shutdown_grace_ms(mut self, ms: u64) -> Self {
        self.shutdown_grace_ms = Some(ms);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut StatusConfig) {
        if self.click_events.is_some() || self.shutdown_grace_ms.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(enabled) = self.click_events {
            config.bar.click_events = enabled;
        }

        if let Some(ms) = self.shutdown_grace_ms {
            config.runtime.shutdown_grace_ms = ms;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
