//! # Verifier Protocol
//!
//! Request validation, command routing and response framing.
//!
//! ## Components
//! - **Message**: parses inbound frames into [`message::IncomingMessage`] and
//!   builds outbound frames
//! - **Dispatcher**: routes validated commands to the
//!   [`DeviceBridge`](crate::device::DeviceBridge) and produces the reply
//!
//! ## Commands
//! | Code  | Command                      | Reserved gap | Payload          |
//! |-------|------------------------------|--------------|------------------|
//! | 0x010 | get id code                  | no           | 0 bytes          |
//! | 0x012 | get chip id                  | no           | 0 bytes          |
//! | 0x0d5 | session teardown             | yes          | magic + session  |
//! | 0x181 | get attestation certificate  | no           | 4 bytes          |
//! | 0x182 | create attestation subkey    | yes          | variable         |
//! | 0x183 | get measurement              | yes          | variable         |
//! | 0x194 | mctp / generic mailbox       | no           | variable         |
//! | 0x500 | get device identity          | no           | 0 bytes          |

pub mod dispatcher;
pub mod message;


use crate::config::{RESERVED_GAP_SIZE, SESSION_TEARDOWN_PAYLOAD_SIZE, WORD_SIZE};

/// Commands a verifier may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    GetIdCode,
    GetChipId,
    SessionTeardown,
    GetAttestationCertificate,
    CreateAttestationSubkey,
    GetMeasurement,
    Mctp,
    GetDeviceIdentity,
    /// Any code outside the supported set
    Unknown(u16),
}

impl CommandCode {
    pub fn from_u16(code: u16) -> Self {
        match code {
            0x10 => CommandCode::GetIdCode,
            0x12 => CommandCode::GetChipId,
            0xd5 => CommandCode::SessionTeardown,
            0x181 => CommandCode::GetAttestationCertificate,
            0x182 => CommandCode::CreateAttestationSubkey,
            0x183 => CommandCode::GetMeasurement,
            0x194 => CommandCode::Mctp,
            0x500 => CommandCode::GetDeviceIdentity,
            other => CommandCode::Unknown(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CommandCode::GetIdCode => 0x10,
            CommandCode::GetChipId => 0x12,
            CommandCode::SessionTeardown => 0xd5,
            CommandCode::GetAttestationCertificate => 0x181,
            CommandCode::CreateAttestationSubkey => 0x182,
            CommandCode::GetMeasurement => 0x183,
            CommandCode::Mctp => 0x194,
            CommandCode::GetDeviceIdentity => 0x500,
            CommandCode::Unknown(code) => *code,
        }
    }

    /// Bytes skipped between the header and the payload.
    pub fn reserved_gap(&self) -> usize {
        match self {
            CommandCode::SessionTeardown
            | CommandCode::CreateAttestationSubkey
            | CommandCode::GetMeasurement => RESERVED_GAP_SIZE,
            _ => 0,
        }
    }

    /// Exact payload size, for commands that have one.
    pub fn fixed_payload_size(&self) -> Option<usize> {
        match self {
            CommandCode::SessionTeardown => Some(SESSION_TEARDOWN_PAYLOAD_SIZE),
            CommandCode::GetAttestationCertificate => Some(WORD_SIZE),
            CommandCode::GetChipId | CommandCode::GetDeviceIdentity | CommandCode::GetIdCode => {
                Some(0)
            }
            _ => None,
        }
    }
}

impl From<u16> for CommandCode {
    fn from(code: u16) -> Self {
        CommandCode::from_u16(code)
    }
}

/// Codes the gateway itself reports in the response `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    None = 0x00,
    Generic = 0x01,
    UnknownCommand = 0x03,
    InvalidHeader = 0x04,
    InvalidMagic = 0x80,
}

impl ErrorCode {
    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl From<ErrorCode> for ResponseCode {
    fn from(code: ErrorCode) -> Self {
        ResponseCode(code.as_u16())
    }
}

/// Value placed in the `code` field of a response header.
///
/// Either a gateway [`ErrorCode`] or a status passed through from the device.
/// Only the low 11 bits reach the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(pub u16);

impl ResponseCode {
    /// Device statuses are signed 32-bit values; the header keeps their low bits.
    pub fn from_status(status: i32) -> Self {
        ResponseCode(status as u16)
    }
}
