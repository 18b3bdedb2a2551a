//! Configuration for the GCodeLink bridge
//!
//! Supports JSON and TOML files. Every section has defaults, so a file only
//! needs the values it changes.
//!
//! Configuration is organized into sections:
//! - `serial`: controller port and framing
//! - `job`: program directory, timeouts, progress cadence
//! - `interactive`: peer listener and echo behaviour
//! - `console`: diagnostic line history
//! - `link`: polling loop timing and framer bounds

use crate::error::{ConfigError, SettingsError, SettingsResult};
use gcodelink_communication::{ConnectionParams, SerialParity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Serial port settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
    /// Driver read timeout in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        let params = ConnectionParams::default();
        Self {
            port: params.port,
            baud_rate: params.baud_rate,
            data_bits: params.data_bits,
            stop_bits: params.stop_bits,
            parity: params.parity,
            flow_control: params.flow_control,
            read_timeout_ms: params.timeout_ms,
        }
    }
}

impl SerialSettings {
    /// Parameters for opening the port
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            flow_control: self.flow_control,
            timeout_ms: self.read_timeout_ms,
        }
    }
}

/// Autonomous job settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Directory programs are served from
    pub program_dir: PathBuf,
    /// Homing acknowledgment timeout in seconds
    pub homing_timeout_secs: u64,
    /// Program line acknowledgment timeout in seconds
    pub command_timeout_secs: u64,
    /// Publish progress every this many lines
    pub progress_interval: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            program_dir: PathBuf::from("."),
            homing_timeout_secs: 60,
            command_timeout_secs: 30,
            progress_interval: 10,
        }
    }
}

impl JobSettings {
    /// Homing timeout
    pub fn homing_timeout(&self) -> Duration {
        Duration::from_secs(self.homing_timeout_secs)
    }

    /// Program line timeout
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// What the peer receives from the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EchoPolicy {
    /// Every byte the controller sends, as received
    #[default]
    Transparent,
    /// Complete non-blank lines only
    Lines,
}

impl std::fmt::Display for EchoPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transparent => write!(f, "transparent"),
            Self::Lines => write!(f, "lines"),
        }
    }
}

impl std::str::FromStr for EchoPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transparent" => Ok(Self::Transparent),
            "lines" => Ok(Self::Lines),
            other => Err(ConfigError::InvalidValue {
                key: "interactive.echo".to_string(),
                reason: format!("unknown echo policy '{}'", other),
            }),
        }
    }
}

/// Interactive peer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractiveSettings {
    /// Listener address, `host:port`
    pub listen_addr: String,
    /// Controller output forwarded to the peer
    pub echo: EchoPolicy,
    /// Soft reset the controller when a peer connects
    pub reset_on_connect: bool,
    /// Partial line bound before a forced flush
    pub max_line_length: usize,
    /// Tell the peer when a line is dropped because the controller is busy
    pub busy_feedback: bool,
}

impl Default for InteractiveSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8880".to_string(),
            echo: EchoPolicy::Transparent,
            reset_on_connect: false,
            max_line_length: 128,
            busy_feedback: true,
        }
    }
}

/// Console history settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    /// Entries kept
    pub capacity: usize,
    /// Stop recording while a job is active
    pub suppress_while_running: bool,
    /// Stop recording while a peer is connected
    pub suppress_while_connected: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            capacity: 50,
            suppress_while_running: true,
            suppress_while_connected: true,
        }
    }
}

/// Polling loop and link framing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Polling loop period in milliseconds
    pub tick_interval_ms: u64,
    /// Link counts as active for this long after the last received byte
    pub activity_window_ms: u64,
    /// Pause after a soft reset in milliseconds
    pub reset_pause_ms: u64,
    /// Partial controller line bound before a forced flush
    pub max_line_length: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5,
            activity_window_ms: 2000,
            reset_pause_ms: 100,
            max_line_length: 1024,
        }
    }
}

impl LinkSettings {
    /// Polling loop period
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Activity window
    pub fn activity_window(&self) -> Duration {
        Duration::from_millis(self.activity_window_ms)
    }

    /// Pause after a soft reset
    pub fn reset_pause(&self) -> Duration {
        Duration::from_millis(self.reset_pause_ms)
    }
}

/// Complete bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port
    pub serial: SerialSettings,
    /// Autonomous jobs
    pub job: JobSettings,
    /// Interactive peer
    pub interactive: InteractiveSettings,
    /// Console history
    pub console: ConsoleSettings,
    /// Polling loop
    pub link: LinkSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(other.unwrap_or("none").to_string()).into()),
    }
}

impl Config {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration file location
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("gcodelink").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no configuration directory on this platform".into())
            })
    }

    /// Load and validate a `.json` or `.toml` file
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::LoadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path`, or the default location, falling back to defaults when
    /// the default file does not exist
    ///
    /// An explicitly named file must exist.
    pub fn load_or_default(path: Option<&Path>) -> SettingsResult<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }

        match Self::default_path() {
            Ok(path) if path.exists() => Self::load_from_file(&path),
            _ => {
                tracing::debug!("No configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Validate and save to a `.json` or `.toml` file
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content).map_err(|e| SettingsError::SaveError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "serial.port".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::out_of_range("serial.baud_rate", self.serial.baud_rate));
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(ConfigError::out_of_range("serial.data_bits", self.serial.data_bits));
        }
        if !(1..=2).contains(&self.serial.stop_bits) {
            return Err(ConfigError::out_of_range("serial.stop_bits", self.serial.stop_bits));
        }

        if self.job.homing_timeout_secs == 0 {
            return Err(ConfigError::out_of_range(
                "job.homing_timeout_secs",
                self.job.homing_timeout_secs,
            ));
        }
        if self.job.command_timeout_secs == 0 {
            return Err(ConfigError::out_of_range(
                "job.command_timeout_secs",
                self.job.command_timeout_secs,
            ));
        }
        if self.job.progress_interval == 0 {
            return Err(ConfigError::out_of_range(
                "job.progress_interval",
                self.job.progress_interval,
            ));
        }

        if self.interactive.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                key: "interactive.listen_addr".to_string(),
                reason: format!("'{}' is not host:port", self.interactive.listen_addr),
            });
        }
        if self.interactive.max_line_length == 0 {
            return Err(ConfigError::out_of_range(
                "interactive.max_line_length",
                self.interactive.max_line_length,
            ));
        }

        if self.console.capacity == 0 {
            return Err(ConfigError::out_of_range("console.capacity", self.console.capacity));
        }

        if self.link.tick_interval_ms == 0 {
            return Err(ConfigError::out_of_range(
                "link.tick_interval_ms",
                self.link.tick_interval_ms,
            ));
        }
        if self.link.max_line_length == 0 {
            return Err(ConfigError::out_of_range(
                "link.max_line_length",
                self.link.max_line_length,
            ));
        }
        if self.link.reset_pause_ms > 1000 {
            return Err(ConfigError::out_of_range(
                "link.reset_pause_ms",
                self.link.reset_pause_ms,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.job.homing_timeout(), Duration::from_secs(60));
        assert_eq!(config.job.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.interactive.max_line_length, 128);
        assert_eq!(config.console.capacity, 50);
        assert_eq!(config.link.reset_pause(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [serial]
            port = "/dev/ttyACM0"

            [interactive]
            echo = "lines"
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.interactive.echo, EchoPolicy::Lines);
        assert!(config.interactive.busy_feedback);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.serial.baud_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValueOutOfRange { .. })
        ));

        let mut config = Config::default();
        config.interactive.listen_addr = "nowhere".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut config = Config::default();
        config.job.progress_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_echo_policy_from_str() {
        assert_eq!("Lines".parse::<EchoPolicy>().unwrap(), EchoPolicy::Lines);
        assert_eq!(
            "transparent".parse::<EchoPolicy>().unwrap(),
            EchoPolicy::Transparent
        );
        assert!("raw".parse::<EchoPolicy>().is_err());
    }

    #[test]
    fn test_connection_params() {
        let mut config = Config::default();
        config.serial.port = "COM4".to_string();
        config.serial.parity = SerialParity::Even;
        let params = config.serial.connection_params();
        assert_eq!(params.port, "COM4");
        assert_eq!(params.parity, SerialParity::Even);
        assert_eq!(params.baud_rate, 115200);
    }
}
