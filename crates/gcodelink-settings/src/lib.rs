//! GCodeLink Settings Crate
//!
//! Loads, validates, and saves the bridge configuration.

pub mod config;
pub mod error;

pub use config::{
    Config, ConsoleSettings, EchoPolicy, InteractiveSettings, JobSettings, LinkSettings,
    SerialSettings,
};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
