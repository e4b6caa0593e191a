//! Structured logging setup.
//!
//! The gateway logs through `tracing`. [`init`] installs a subscriber whose
//! minimum level comes from [`LoggingConfig`]; `RUST_LOG`, when set, takes
//! precedence so individual modules can be turned up in the field.

use crate::config::LoggingConfig;
use std::fmt;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Operator-facing severity names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    /// Startup failures only; tracing has no separate level, so this filters at `ERROR`
    Fatal,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "Debug",
            LogLevel::Info => "Info",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
            LogLevel::Fatal => "Fatal",
        }
    }

    /// Equivalent tracing level used for filtering.
    pub fn as_tracing_level(&self) -> Level {
        match self {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warning => Level::WARN,
            LogLevel::Error | LogLevel::Fatal => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unrecognized severity name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLogLevel(pub String);

impl fmt::Display for UnknownLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown log level '{}'", self.0)
    }
}

impl std::error::Error for UnknownLogLevel {}

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    /// Accepts the CLI names exactly as documented; config files may also use
    /// lowercase tracing names (`debug`, `warn`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Debug" | "debug" => Ok(LogLevel::Debug),
            "Info" | "info" => Ok(LogLevel::Info),
            "Warning" | "warning" | "warn" => Ok(LogLevel::Warning),
            "Error" | "error" => Ok(LogLevel::Error),
            "Fatal" | "fatal" => Ok(LogLevel::Fatal),
            other => Err(UnknownLogLevel(other.to_string())),
        }
    }
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            config
                .log_level
                .as_tracing_level()
                .as_str()
                .to_ascii_lowercase(),
        )
    })
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed (e.g. by another test).
pub fn init(config: &LoggingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(build_filter(config));

    if config.json_format {
        registry
            .with(tfmt::layer().json().with_target(true))
            .try_init()
            .is_ok()
    } else {
        registry
            .with(tfmt::layer().with_target(false))
            .try_init()
            .is_ok()
    }
}
