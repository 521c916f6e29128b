//! # Configuration Management
//!
//! Centralized configuration for peers and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - TOML strings via `from_toml()`
//! - Environment variables via `from_env()`
//! - Direct instantiation with defaults
//!
//! Both ends of a connection must agree on `max_frame_size`; a receiver with a
//! smaller limit than its sender will disconnect on the first large frame.

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Size of the frame length prefix on the wire
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Max allowed serialized packet size (64 KiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Upper bound accepted by validation for `max_frame_size` (16 MiB)
pub const FRAME_SIZE_CEILING: usize = 16 * 1024 * 1024;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DataFlowConfig {
    /// Peer configuration
    #[serde(default)]
    pub peer: PeerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DataFlowConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(size) = std::env::var("DATAFLOW_MAX_FRAME_SIZE") {
            config.peer.max_frame_size = size.parse::<usize>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid DATAFLOW_MAX_FRAME_SIZE: {e}"))
            })?;
        }

        if let Ok(ms) = std::env::var("DATAFLOW_DISCONNECT_TIMEOUT_MS") {
            let ms = ms.parse::<u64>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid DATAFLOW_DISCONNECT_TIMEOUT_MS: {e}"))
            })?;
            config.peer.disconnect_timeout = Duration::from_millis(ms);
        }

        if let Ok(level) = std::env::var("DATAFLOW_LOG_LEVEL") {
            config.logging.log_level = level.parse::<Level>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid DATAFLOW_LOG_LEVEL: {level}"))
            })?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Validate the configuration.
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.peer.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Per-peer settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PeerConfig {
    /// Largest serialized packet accepted on send and on receive
    pub max_frame_size: usize,

    /// How long `disconnect` waits for the receive loop before aborting it
    #[serde(with = "duration_serde")]
    pub disconnect_timeout: Duration,

    /// Initial capacity of the receive buffer
    #[serde(default = "default_read_buffer_capacity")]
    pub read_buffer_capacity: usize,
}

fn default_read_buffer_capacity() -> usize {
    8 * 1024
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            disconnect_timeout: timeout::SHUTDOWN_TIMEOUT,
            read_buffer_capacity: default_read_buffer_capacity(),
        }
    }
}

impl PeerConfig {
    /// Validate peer configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_size == 0 {
            errors.push("Max frame size cannot be 0".to_string());
        } else if self.max_frame_size > FRAME_SIZE_CEILING {
            errors.push(format!(
                "Max frame size too large: {} bytes (maximum: {} bytes)",
                self.max_frame_size, FRAME_SIZE_CEILING
            ));
        }

        if self.disconnect_timeout.as_millis() < 10 {
            errors.push("Disconnect timeout too short (minimum: 10ms)".to_string());
        } else if self.disconnect_timeout.as_secs() > 60 {
            errors.push("Disconnect timeout too long (maximum: 60s)".to_string());
        }

        if self.read_buffer_capacity == 0 {
            errors.push("Read buffer capacity cannot be 0".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,

    /// Whether to write logs to stderr; when off only the filter is installed
    #[serde(default = "default_log_to_console")]
    pub log_to_console: bool,
}

fn default_log_to_console() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("dataflow"),
            log_level: Level::INFO,
            json_format: false,
            log_to_console: true,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
