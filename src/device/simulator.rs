//! In-process stand-in for the FPGA crypto service.
//!
//! Responses are deterministic filler so tests can assert on sizes and codes
//! without hardware. State sits behind a `Mutex`, so a single simulator can be
//! shared by every connection the gateway serves.

use super::{BridgeError, BridgeReply, BridgeResult, DeviceBridge, UNSUPPORTED_STATUS};
use crate::config::WORD_SIZE;
use crate::protocol::CommandCode;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Chip identifier reported by the simulator, low word first.
pub const SIMULATED_CHIP_ID: [u8; 8] = [0x5A, 0xEC, 0xAC, 0x18, 0xCC, 0xC6, 0x82, 0x07];
pub const SUBKEY_RESPONSE_SIZE: usize = 820;
pub const MEASUREMENT_RESPONSE_MAX_SIZE: usize = 4092;
pub const CERTIFICATE_RESPONSE_SIZE: usize = 4096;
pub const DEFAULT_SESSION_ID: u32 = 0xFFFF_FFFF;
pub const DEFAULT_CERTIFICATE_REQUEST: u8 = 0x01;

/// Byte used to fill synthetic device responses.
const FILL_BYTE: u8 = 0x7E;

/// How many times each bridge operation has been invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub chip_id: u64,
    pub session_teardown: u64,
    pub create_attestation_subkey: u64,
    pub measurement: u64,
    pub attestation_certificate: u64,
    pub mailbox: u64,
}

impl CallCounts {
    pub fn total(&self) -> u64 {
        self.chip_id
            + self.session_teardown
            + self.create_attestation_subkey
            + self.measurement
            + self.attestation_certificate
            + self.mailbox
    }
}

#[derive(Debug)]
struct State {
    fail_transport: bool,
    certificate_support: bool,
    expected_session_id: u32,
    expected_certificate_request: u8,
    calls: CallCounts,
}

/// Simulated device bridge.
///
/// ```rust
/// use verifier_gateway::device::{DeviceBridge, SimulatedDevice};
///
/// let device = SimulatedDevice::new();
/// let reply = device.chip_id().unwrap();
/// assert_eq!(reply.payload.len(), 8);
/// assert_eq!(device.calls().chip_id, 1);
/// ```
#[derive(Debug)]
pub struct SimulatedDevice {
    state: Mutex<State>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                fail_transport: false,
                certificate_support: true,
                expected_session_id: DEFAULT_SESSION_ID,
                expected_certificate_request: DEFAULT_CERTIFICATE_REQUEST,
                calls: CallCounts::default(),
            }),
        }
    }

    /// Session id that tears down successfully.
    pub fn with_expected_session(self, session_id: u32) -> Self {
        self.lock().expected_session_id = session_id;
        self
    }

    /// Certificate request the simulator answers; others are unsupported.
    pub fn with_certificate_request(self, request: u8) -> Self {
        self.lock().expected_certificate_request = request;
        self
    }

    pub fn with_certificate_support(self, supported: bool) -> Self {
        self.lock().certificate_support = supported;
        self
    }

    /// Make every subsequent call fail as if the device were unreachable.
    pub fn fail_transport(&self, fail: bool) {
        self.lock().fail_transport = fail;
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    // A panic while holding the lock cannot leave State inconsistent, so a
    // poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call and check transport health in one critical section.
    fn enter(
        &self,
        operation: &'static str,
        count: impl FnOnce(&mut CallCounts),
    ) -> BridgeResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        count(&mut state.calls);
        debug!(operation, "Simulated device call");
        if state.fail_transport {
            return Err(BridgeError::CallFailed {
                operation,
                reason: "simulated transport failure".to_string(),
            });
        }
        Ok(state)
    }
}

fn filler(len: usize) -> Vec<u8> {
    vec![FILL_BYTE; len]
}

impl DeviceBridge for SimulatedDevice {
    fn chip_id(&self) -> BridgeResult<BridgeReply> {
        self.enter("chip_id", |c| c.chip_id += 1)?;
        Ok(BridgeReply::new(SIMULATED_CHIP_ID.to_vec(), 0))
    }

    fn session_teardown(&self, session_id: u32) -> BridgeResult<i32> {
        let state = self.enter("session_teardown", |c| c.session_teardown += 1)?;
        if session_id == state.expected_session_id {
            Ok(0)
        } else {
            Ok(-1)
        }
    }

    fn create_attestation_subkey(&self, _request: &[u8]) -> BridgeResult<BridgeReply> {
        self.enter("create_attestation_subkey", |c| {
            c.create_attestation_subkey += 1
        })?;
        Ok(BridgeReply::new(filler(SUBKEY_RESPONSE_SIZE), 0))
    }

    fn measurement(&self, request: &[u8]) -> BridgeResult<BridgeReply> {
        self.enter("measurement", |c| c.measurement += 1)?;
        let len = (request.len() - request.len() % WORD_SIZE).min(MEASUREMENT_RESPONSE_MAX_SIZE);
        Ok(BridgeReply::new(filler(len), 0))
    }

    fn attestation_certificate(&self, request: u8) -> BridgeResult<BridgeReply> {
        let state = self.enter("attestation_certificate", |c| {
            c.attestation_certificate += 1
        })?;
        if !state.certificate_support || request != state.expected_certificate_request {
            return Ok(BridgeReply::status_only(UNSUPPORTED_STATUS));
        }
        Ok(BridgeReply::new(filler(CERTIFICATE_RESPONSE_SIZE), 0))
    }

    fn mailbox(&self, command: CommandCode, payload: &[u8]) -> BridgeResult<BridgeReply> {
        self.enter("mailbox", |c| c.mailbox += 1)?;
        debug!(command = ?command, bytes = payload.len(), "Mailbox echo");
        Ok(BridgeReply::new(payload.to_vec(), 0))
    }
}
