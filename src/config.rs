//! Application configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (default `config/mercury_itc.toml`)
//! 2. environment variables prefixed with `MERCURY_ITC_`, nested keys
//!    separated by `__`
//!
//! # Example
//! ```no_run
//! use mercury_itc::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! println!("Instrument: {}", config.instrument.id);
//! # Ok::<(), figment::Error>(())
//! ```
//!
//! `MERCURY_ITC_INSTRUMENT__CONFIG__HOST=10.0.0.5` overrides the controller
//! address without editing the file.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/mercury_itc.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "MERCURY_ITC_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// The controller to talk to
    #[serde(default)]
    pub instrument: InstrumentDefinition,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Console log format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Optional file receiving a copy of every log event
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            log_file: None,
        }
    }
}

/// Instrument definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentDefinition {
    /// Instrument identifier used in log output
    #[serde(default = "default_instrument_id")]
    pub id: String,
    /// Driver type, matched against `DriverFactory::driver_type`
    #[serde(default = "default_instrument_type")]
    pub r#type: String,
    /// Driver-specific configuration, passed to the factory unchanged
    #[serde(default = "empty_table")]
    pub config: toml::Value,
}

impl Default for InstrumentDefinition {
    fn default() -> Self {
        Self {
            id: default_instrument_id(),
            r#type: default_instrument_type(),
            config: empty_table(),
        }
    }
}

fn default_name() -> String {
    "Mercury iTC".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_instrument_id() -> String {
    "itc".to_string()
}

fn default_instrument_type() -> String {
    "mercury_itc".to_string()
}

fn empty_table() -> toml::Value {
    toml::Value::Table(toml::Table::new())
}

impl AppConfig {
    /// Load from the default path and environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path.as_ref(), ENV_PREFIX).extract()
    }

    fn figment(path: &Path, env_prefix: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(env_prefix).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        if self.instrument.id.trim().is_empty() {
            return Err("Instrument id must not be empty".to_string());
        }

        if !self.instrument.config.is_table() {
            return Err(format!(
                "Instrument '{}' config must be a table",
                self.instrument.id
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
            [application]
            name = "Teslatron"
            log_level = "debug"

            [instrument]
            id = "itc-1"
            type = "mercury_itc"

            [instrument.config]
            host = "192.168.0.20"
            primary_channel = "probe"
            "#,
        );

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.name, "Teslatron");
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.application.log_format, "compact");
        assert_eq!(config.instrument.id, "itc-1");
        assert_eq!(
            config.instrument.config.get("host").and_then(|v| v.as_str()),
            Some("192.168.0.20")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::figment(&dir.path().join("absent.toml"), "MERCURY_ITC_TEST_ABSENT_")
            .extract::<AppConfig>()
            .unwrap();

        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.instrument.r#type, "mercury_itc");
        assert!(config.instrument.config.is_table());
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_config(
            r#"
            [instrument.config]
            host = "192.168.0.20"
            "#,
        );
        std::env::set_var("MERCURY_ITC_TEST_ENV_INSTRUMENT__CONFIG__HOST", "10.0.0.5");
        std::env::set_var("MERCURY_ITC_TEST_ENV_APPLICATION__LOG_LEVEL", "warn");

        let config = AppConfig::figment(file.path(), "MERCURY_ITC_TEST_ENV_")
            .extract::<AppConfig>()
            .unwrap();

        assert_eq!(
            config.instrument.config.get("host").and_then(|v| v.as_str()),
            Some("10.0.0.5")
        );
        assert_eq!(config.application.log_level, "warn");
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = AppConfig::default();
        config.application.log_format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_instrument_config_must_be_table() {
        let mut config = AppConfig::default();
        config.instrument.config = toml::Value::String("host".to_string());
        assert!(config.validate().is_err());
    }
}
