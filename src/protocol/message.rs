//! # Protocol Engine
//!
//! Validation of inbound verifier frames and construction of outbound ones.
//!
//! A frame is accepted only when all of these hold:
//! 1. it holds at least a header;
//! 2. the header `length` (in words) matches the trailing byte count exactly;
//! 3. it is long enough for the command's reserved gap;
//! 4. commands with a fixed payload size carry exactly that many bytes;
//! 5. a session teardown payload starts with [`SESSION_TEARDOWN_MAGIC`].
//!
//! Responses always echo the request's `client` and `id` tags.

use crate::config::{
    CERTIFICATE_REQUEST_MASK, HEADER_SIZE, SESSION_ID_OFFSET, SESSION_TEARDOWN_MAGIC,
    SESSION_TEARDOWN_PAYLOAD_SIZE, WORD_SIZE,
};
use crate::core::header::{CommandHeader, MAX_FIELD_VALUE};
use crate::core::wire;
use crate::error::{ContractViolation, FrameError};
use crate::protocol::{CommandCode, ErrorCode, ResponseCode};
use bytes::Bytes;
use thiserror::Error;

/// A request that passed validation.
///
/// Only [`IncomingMessage::parse`] creates one, so holding a value proves the
/// frame was well formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    header: CommandHeader,
    command: CommandCode,
    payload: Bytes,
}

/// A request that failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct Rejection {
    /// Decoded request header, or all zeroes if the frame was shorter than one
    pub header: CommandHeader,
    pub error: FrameError,
}

impl Rejection {
    pub fn error_code(&self) -> ErrorCode {
        self.error.error_code()
    }

    /// Empty response carrying the rejection code.
    pub fn response(&self) -> Vec<u8> {
        build_empty_response(&self.header, self.error_code())
    }
}

impl IncomingMessage {
    /// Validate a raw frame.
    pub fn parse(raw: Bytes) -> Result<Self, Rejection> {
        let Some(header) = CommandHeader::decode_slice(&raw) else {
            return Err(Rejection {
                header: CommandHeader::default(),
                error: FrameError::TooShort { len: raw.len() },
            });
        };
        let reject = |error| Rejection { header, error };

        let actual = raw.len() - HEADER_SIZE;
        let declared = header.payload_len_bytes();
        if actual != declared {
            return Err(reject(FrameError::LengthMismatch { declared, actual }));
        }

        let command = CommandCode::from_u16(header.code);
        let offset = HEADER_SIZE + command.reserved_gap();
        if raw.len() < offset {
            return Err(reject(FrameError::ReservedGapMissing {
                len: raw.len(),
                offset,
            }));
        }

        let payload = raw.slice(offset..);

        if let Some(expected) = command.fixed_payload_size() {
            if payload.len() != expected {
                return Err(reject(FrameError::PayloadSize {
                    command,
                    expected,
                    actual: payload.len(),
                }));
            }
        }

        if command == CommandCode::SessionTeardown {
            // length was checked above, so the magic word is present
            let found = wire::read_word(&payload, 0).unwrap_or_default();
            if found != SESSION_TEARDOWN_MAGIC {
                return Err(reject(FrameError::InvalidMagic { found }));
            }
        }

        Ok(Self {
            header,
            command,
            payload,
        })
    }

    /// Copying variant of [`parse`](Self::parse) for borrowed buffers.
    pub fn parse_slice(raw: &[u8]) -> Result<Self, Rejection> {
        Self::parse(Bytes::copy_from_slice(raw))
    }

    #[inline]
    pub fn header(&self) -> &CommandHeader {
        &self.header
    }

    #[inline]
    pub fn command(&self) -> CommandCode {
        self.command
    }

    /// Payload after the header and any reserved gap.
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Session id of a session teardown request.
    ///
    /// # Panics
    /// If the message is not a session teardown.
    pub fn session_id(&self) -> u32 {
        match self.try_session_id() {
            Ok(id) => id,
            Err(violation) => panic!("{violation}"),
        }
    }

    pub fn try_session_id(&self) -> Result<u32, ContractViolation> {
        const FIELD: &str = "session id";
        self.require(CommandCode::SessionTeardown, FIELD)?;
        wire::read_word(&self.payload, SESSION_ID_OFFSET).ok_or(
            ContractViolation::PayloadTooSmall {
                field: FIELD,
                required: SESSION_TEARDOWN_PAYLOAD_SIZE,
                actual: self.payload.len(),
            },
        )
    }

    /// Certificate request selector of a get-attestation-certificate request.
    ///
    /// # Panics
    /// If the message is not a get-attestation-certificate request.
    pub fn certificate_request(&self) -> u8 {
        match self.try_certificate_request() {
            Ok(request) => request,
            Err(violation) => panic!("{violation}"),
        }
    }

    pub fn try_certificate_request(&self) -> Result<u8, ContractViolation> {
        const FIELD: &str = "certificate request";
        self.require(CommandCode::GetAttestationCertificate, FIELD)?;
        let word =
            wire::read_word(&self.payload, 0).ok_or(ContractViolation::PayloadTooSmall {
                field: FIELD,
                required: WORD_SIZE,
                actual: self.payload.len(),
            })?;
        Ok((word & CERTIFICATE_REQUEST_MASK) as u8)
    }

    fn require(&self, expected: CommandCode, field: &'static str) -> Result<(), ContractViolation> {
        if self.command == expected {
            Ok(())
        } else {
            Err(ContractViolation::WrongCommand {
                field,
                actual: self.command,
            })
        }
    }

    /// Response to this request carrying `payload`.
    pub fn response(&self, payload: &[u8], code: impl Into<ResponseCode>) -> Vec<u8> {
        build_response(&self.header, payload, code)
    }

    pub fn empty_response(&self, code: impl Into<ResponseCode>) -> Vec<u8> {
        build_empty_response(&self.header, code)
    }
}

/// Frame a response to the request described by `request`.
///
/// A payload that is not a whole number of words, or that is too long for the
/// 11-bit length field, is discarded and the response degrades to an empty
/// [`ErrorCode::Generic`] frame.
pub fn build_response(
    request: &CommandHeader,
    payload: &[u8],
    code: impl Into<ResponseCode>,
) -> Vec<u8> {
    let code = code.into();
    if !wire::is_word_aligned(payload.len()) {
        tracing::error!(
            bytes = payload.len(),
            "Payload size not divisible by word size"
        );
        return build_empty_response(request, ErrorCode::Generic);
    }

    let words = wire::words(payload.len());
    if words > usize::from(MAX_FIELD_VALUE) {
        tracing::error!(
            bytes = payload.len(),
            max_words = MAX_FIELD_VALUE,
            "Payload too large for the length field"
        );
        return build_empty_response(request, ErrorCode::Generic);
    }

    let outgoing = CommandHeader::new(request.client, request.id, words as u16, code.0);

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&outgoing.encode());
    out.extend_from_slice(payload);
    out
}

/// Frame a response with no payload.
pub fn build_empty_response(request: &CommandHeader, code: impl Into<ResponseCode>) -> Vec<u8> {
    build_response(request, &[], code)
}

/// Frame a request as a verifier would send it.
///
/// The command's reserved gap is inserted as zero bytes ahead of `payload`.
pub fn encode_request(
    client: u8,
    id: u8,
    command: CommandCode,
    payload: &[u8],
) -> Result<Vec<u8>, FrameError> {
    let body_len = command.reserved_gap() + payload.len();
    if !wire::is_word_aligned(body_len) || wire::words(body_len) > usize::from(MAX_FIELD_VALUE) {
        return Err(FrameError::Unencodable { len: body_len });
    }

    let header = CommandHeader::new(client, id, wire::words(body_len) as u16, command.as_u16());

    let mut out = Vec::with_capacity(HEADER_SIZE + body_len);
    out.extend_from_slice(&header.encode());
    out.resize(HEADER_SIZE + command.reserved_gap(), 0);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Payload of a session teardown request for `session_id`.
pub fn session_teardown_payload(session_id: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(SESSION_TEARDOWN_PAYLOAD_SIZE);
    wire::put_word(&mut payload, SESSION_TEARDOWN_MAGIC);
    wire::put_word(&mut payload, session_id);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mctp_without_gap() {
        let msg = IncomingMessage::parse_slice(&[
            0x94, 0x21, 0x00, 0x10, 0x11, 0x22, 0x33, 0x44, 0xAA, 0xBB, 0xCC, 0xDD,
        ])
        .expect("valid mctp request");
        assert_eq!(msg.command(), CommandCode::Mctp);
        assert_eq!(
            msg.payload().as_ref(),
            &[0x11, 0x22, 0x33, 0x44, 0xAA, 0xBB, 0xCC, 0xDD]
        );
    }

    #[test]
    fn payload_is_zero_copy_slice() {
        let raw = Bytes::from_static(&[
            0x82, 0x21, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0xaa, 0xbb, 0xcc, 0xdd,
        ]);
        let msg = IncomingMessage::parse(raw.clone()).expect("valid subkey request");
        assert_eq!(msg.payload().as_ptr(), raw[8..].as_ptr());
    }

    #[test]
    fn encode_request_inserts_gap() {
        let frame = encode_request(1, 3, CommandCode::GetMeasurement, &[1, 2, 3, 4])
            .expect("aligned payload");
        assert_eq!(frame, vec![0x83, 0x21, 0x00, 0x13, 0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn encode_request_rejects_unaligned() {
        assert_eq!(
            encode_request(0, 0, CommandCode::Mctp, &[1, 2, 3]),
            Err(FrameError::Unencodable { len: 3 })
        );
    }

    #[test]
    fn encode_request_rejects_oversized() {
        let payload = vec![0u8; (usize::from(MAX_FIELD_VALUE) + 1) * WORD_SIZE];
        assert!(encode_request(0, 0, CommandCode::Mctp, &payload).is_err());
    }

    #[test]
    fn status_low_bits_reach_the_wire() {
        let request = CommandHeader::new(1, 0, 0, 0x12);
        let frame = build_empty_response(&request, ResponseCode::from_status(-1));
        let header = CommandHeader::decode_slice(&frame).expect("header present");
        assert_eq!(header.code, MAX_FIELD_VALUE);
    }
}
