//! # Device Bridge
//!
//! The gateway forwards validated verifier requests to the FPGA crypto service
//! through a [`DeviceBridge`]. The bridge owns every hardware detail: request
//! structures, ioctls, mailbox buffers. The gateway only sees a reply payload
//! and a signed status, or a transport failure.
//!
//! A transport failure is distinct from a non-zero status. A status is relayed
//! to the verifier in the response header; a failure closes the connection
//! without a response, the same way the device's system console behaves.
//!
//! [`simulator::SimulatedDevice`] is an in-process bridge used by the binary
//! and the test suite.

pub mod simulator;

use crate::protocol::CommandCode;
use thiserror::Error;

pub use simulator::SimulatedDevice;

/// Status reported by the device for an unsupported certificate request.
pub const UNSUPPORTED_STATUS: i32 = -1;

/// Data and status returned by a successful bridge call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeReply {
    pub payload: Vec<u8>,
    /// Device status, relayed verbatim into the response `code` field
    pub status: i32,
}

impl BridgeReply {
    pub fn new(payload: Vec<u8>, status: i32) -> Self {
        Self { payload, status }
    }

    /// Reply carrying only a status.
    pub fn status_only(status: i32) -> Self {
        Self {
            payload: Vec::new(),
            status,
        }
    }

    #[inline]
    pub fn is_unsupported(&self) -> bool {
        self.status == UNSUPPORTED_STATUS
    }
}

/// The device could not be reached or did not complete the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("device unavailable: {0}")]
    Unavailable(String),

    #[error("{operation} failed: {reason}")]
    CallFailed {
        operation: &'static str,
        reason: String,
    },
}

/// Result type for bridge calls
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Backend able to service verifier commands.
///
/// Calls may block on hardware I/O; the gateway invokes them from a blocking
/// thread. An implementation that is not reentrant must serialize internally.
pub trait DeviceBridge: Send + Sync + 'static {
    fn chip_id(&self) -> BridgeResult<BridgeReply>;

    /// Tear down a SIGMA session; returns the device status.
    fn session_teardown(&self, session_id: u32) -> BridgeResult<i32>;

    fn create_attestation_subkey(&self, request: &[u8]) -> BridgeResult<BridgeReply>;

    fn measurement(&self, request: &[u8]) -> BridgeResult<BridgeReply>;

    /// Fetch a certificate. A status of [`UNSUPPORTED_STATUS`] means the
    /// device does not offer the requested certificate.
    fn attestation_certificate(&self, request: u8) -> BridgeResult<BridgeReply>;

    /// Generic mailbox passthrough for commands without a dedicated call.
    fn mailbox(&self, command: CommandCode, payload: &[u8]) -> BridgeResult<BridgeReply>;
}
