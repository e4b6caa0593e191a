//! # Error Types
//!
//! Error handling for the verifier gateway.
//!
//! Two separate taxonomies live here:
//! - [`GatewayError`]: failures of the gateway process itself (sockets,
//!   configuration, argument parsing).
//! - [`FrameError`]: reasons an inbound request frame was rejected. Each maps to
//!   a network-facing [`ErrorCode`] that is sent back to the verifier.
//!
//! [`ContractViolation`] is neither: it describes misuse of the protocol
//! engine's accessors by gateway code, and is raised as a panic.
//!
//! ## Example Usage
//! ```rust
//! use verifier_gateway::error::{GatewayError, Result};
//! use tracing::error;
//!
//! fn parse_port(arg: &str) -> Result<u16> {
//!     arg.parse()
//!         .map_err(|_| GatewayError::InvalidArguments(format!("not a port: {arg}")))
//! }
//!
//! if let Err(e) = parse_port("http") {
//!     error!(error = %e, "Startup failed");
//! }
//! ```

use crate::protocol::{CommandCode, ErrorCode};
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Slot table errors
    pub const ERR_SLOT_TABLE_LOCK: &str = "Connection slot table lock poisoned";

    /// Connection errors
    pub const ERR_RESPONSE_TIMEOUT: &str = "Timed out waiting for gateway response";

    /// Startup errors
    pub const ERR_ADDRESS_IN_USE: &str = "Address already in use";
    pub const ERR_USAGE: &str =
        "Usage: <executable name> <port number> optional:<log level> e.g ./verifier-gateway 50001 Debug";
    pub const ERR_LOG_LEVELS: &str =
        "Possible log levels: Debug, Info (default), Warning, Error, Fatal";
}

/// Primary error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Rejected frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,
}

/// Type alias for Results using GatewayError
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Why an inbound frame failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("message of {len} bytes is smaller than the command header")]
    TooShort { len: usize },

    #[error("{actual} payload bytes received but header declares {declared}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("message of {len} bytes cannot hold the {offset}-byte header and reserved gap")]
    ReservedGapMissing { len: usize, offset: usize },

    #[error("{command:?} expects a {expected}-byte payload, got {actual}")]
    PayloadSize {
        command: CommandCode,
        expected: usize,
        actual: usize,
    },

    #[error("incorrect session teardown magic: {found:#010x}")]
    InvalidMagic { found: u32 },

    #[error("body of {len} bytes is not a whole number of words or exceeds the length field")]
    Unencodable { len: usize },
}

impl FrameError {
    /// Network-facing code reported to the verifier for this rejection.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            FrameError::InvalidMagic { .. } => ErrorCode::InvalidMagic,
            FrameError::TooShort { .. }
            | FrameError::LengthMismatch { .. }
            | FrameError::ReservedGapMissing { .. }
            | FrameError::PayloadSize { .. }
            | FrameError::Unencodable { .. } => ErrorCode::InvalidHeader,
        }
    }
}

/// Misuse of a command-specific accessor on a validated request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("attempt to read {field} from a {actual:?} message")]
    WrongCommand {
        field: &'static str,
        actual: CommandCode,
    },

    #[error("{field}: payload of {actual} bytes is smaller than {required}")]
    PayloadTooSmall {
        field: &'static str,
        required: usize,
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_errors_map_to_wire_codes() {
        assert_eq!(
            FrameError::TooShort { len: 3 }.error_code(),
            ErrorCode::InvalidHeader
        );
        assert_eq!(
            FrameError::InvalidMagic { found: 0xddcc_bbaa }.error_code(),
            ErrorCode::InvalidMagic
        );
        assert_eq!(
            FrameError::PayloadSize {
                command: CommandCode::GetChipId,
                expected: 0,
                actual: 4
            }
            .error_code(),
            ErrorCode::InvalidHeader
        );
    }

    #[test]
    fn magic_is_formatted_as_hex() {
        let msg = FrameError::InvalidMagic { found: 0xddcc_bbaa }.to_string();
        assert!(msg.contains("0xddccbbaa"), "{msg}");
    }
}
