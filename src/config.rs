//! # Configuration Management
//!
//! Centralized configuration for the verifier gateway.
//!
//! This module holds the wire-protocol constants and the structured runtime
//! configuration for the listener, connection table and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - `VERIFIER_GATEWAY_*` environment overrides via `from_env()`
//!
//! ## Limits
//! - At most [`MAX_CONNECTIONS`] verifier connections are served at once
//! - Reads are capped at [`MAX_MESSAGE_SIZE`] bytes per message
//! - After [`IDLE_TIMEOUT`] without any socket activity every client is dropped

use crate::error::{GatewayError, Result};
use crate::utils::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Size of the command header in bytes
pub const HEADER_SIZE: usize = 4;

/// Size of a protocol word in bytes; header `length` counts these
pub const WORD_SIZE: usize = 4;

/// Reserved bytes between header and payload for teardown, subkey and measurement requests
pub const RESERVED_GAP_SIZE: usize = 4;

/// Magic word leading every session teardown payload
pub const SESSION_TEARDOWN_MAGIC: u32 = 0xb852_e2a4;

/// Session teardown payload: magic word followed by the session id
pub const SESSION_TEARDOWN_PAYLOAD_SIZE: usize = 8;

/// Byte offset of the session id within the teardown payload
pub const SESSION_ID_OFFSET: usize = 4;

/// Certificate request field occupies the low byte of the request word
pub const CERTIFICATE_REQUEST_MASK: u32 = 0xFF;

/// Maximum number of bytes read for a single message
pub const MAX_MESSAGE_SIZE: usize = 10_000;

/// Maximum number of simultaneously served verifier connections
pub const MAX_CONNECTIONS: usize = 20;

/// Whole-server inactivity period after which all clients are dropped
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Port used when no configuration names one
pub const DEFAULT_PORT: u16 = 50001;

const ENV_CONFIG_PATH: &str = "VERIFIER_GATEWAY_CONFIG";
const ENV_BIND_ADDRESS: &str = "VERIFIER_GATEWAY_BIND_ADDRESS";
const ENV_MAX_CONNECTIONS: &str = "VERIFIER_GATEWAY_MAX_CONNECTIONS";
const ENV_IDLE_TIMEOUT_MS: &str = "VERIFIER_GATEWAY_IDLE_TIMEOUT_MS";
const ENV_LOG_JSON: &str = "VERIFIER_GATEWAY_LOG_JSON";

/// Top-level gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GatewayConfig {
    /// Listener and connection table configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| GatewayError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| GatewayError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| GatewayError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from the environment.
    ///
    /// `VERIFIER_GATEWAY_CONFIG` names an optional TOML file used as the base;
    /// the remaining variables override individual fields.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(ENV_CONFIG_PATH) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(addr) = std::env::var(ENV_BIND_ADDRESS) {
            config.server.address = addr;
        }

        if let Ok(max) = std::env::var(ENV_MAX_CONNECTIONS) {
            if let Ok(val) = max.parse::<usize>() {
                config.server.max_connections = val;
            }
        }

        if let Ok(timeout) = std::env::var(ENV_IDLE_TIMEOUT_MS) {
            if let Ok(val) = timeout.parse::<u64>() {
                config.server.idle_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(json) = std::env::var(ENV_LOG_JSON) {
            config.logging.json_format = matches!(json.as_str(), "1" | "true" | "TRUE");
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

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.server.validate();
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Listener and connection table configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:50001")
    pub address: String,

    /// Maximum number of concurrently served connections
    pub max_connections: usize,

    /// Whole-server inactivity period before all clients are dropped
    #[serde(with = "duration_serde")]
    pub idle_timeout: Duration,

    /// Maximum number of bytes read as one message
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: format!("0.0.0.0:{DEFAULT_PORT}"),
            max_connections: MAX_CONNECTIONS,
            idle_timeout: IDLE_TIMEOUT,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl ServerConfig {
    /// Replace the port of the listen address, keeping its host part.
    pub fn with_port(mut self, port: u16) -> Self {
        let ip = self
            .address
            .parse::<SocketAddr>()
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        self.address = SocketAddr::new(ip, port).to_string();
        self
    }

    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:50001')",
                self.address
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 1024 {
            errors.push(format!(
                "Max connections too high: {} (maximum: 1024)",
                self.max_connections
            ));
        }

        if self.idle_timeout.as_millis() < 100 {
            errors.push("Idle timeout too short (minimum: 100ms)".to_string());
        } else if self.idle_timeout.as_secs() > 3600 {
            errors.push("Idle timeout too long (maximum: 1 hour)".to_string());
        }

        if self.max_message_size < HEADER_SIZE {
            errors.push(format!(
                "Max message size too small: {} (minimum: {HEADER_SIZE} bytes)",
                self.max_message_size
            ));
        } else if self.max_message_size > 1024 * 1024 {
            errors.push(format!(
                "Max message size too large: {} bytes (maximum: 1 MB)",
                self.max_message_size
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name attached to startup logs
    pub app_name: String,

    /// Minimum severity
    #[serde(with = "log_level_serde")]
    pub log_level: LogLevel,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("verifier-gateway"),
            log_level: LogLevel::Info,
            json_format: false,
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

/// Helper module for LogLevel serialization/deserialization
mod log_level_serde {
    use crate::utils::logging::LogLevel;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;

    pub fn serialize<S>(level: &LogLevel, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.as_str().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        LogLevel::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
