//! Property-based tests using proptest
//!
//! These tests check the header codec and frame validation rules across
//! randomly generated inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::Bytes;
use proptest::prelude::*;
use std::sync::Arc;
use verifier_gateway::core::header::{CommandHeader, MAX_FIELD_VALUE};
use verifier_gateway::device::SimulatedDevice;
use verifier_gateway::protocol::dispatcher::CommandDispatcher;
use verifier_gateway::protocol::message::{build_response, IncomingMessage};
use verifier_gateway::protocol::{CommandCode, ErrorCode};
use verifier_gateway::transport::{MessageHandler, Reply};

fn header_fields() -> impl Strategy<Value = CommandHeader> {
    (
        0u8..16,
        0u8..16,
        any::<bool>(),
        0u16..=MAX_FIELD_VALUE,
        any::<bool>(),
        0u16..=MAX_FIELD_VALUE,
    )
        .prop_map(|(client, id, reserved1, length, reserved2, code)| CommandHeader {
            client,
            id,
            reserved1,
            length,
            reserved2,
            code,
        })
}

// Property: every 32-bit word decodes and re-encodes to itself
proptest! {
    #[test]
    fn prop_header_word_roundtrip(word in any::<u32>()) {
        let bytes = word.to_le_bytes();
        prop_assert_eq!(CommandHeader::decode(bytes).encode(), bytes);
    }
}

// Property: in-range fields survive encoding
proptest! {
    #[test]
    fn prop_header_fields_roundtrip(header in header_fields()) {
        prop_assert_eq!(CommandHeader::decode(header.encode()), header);
    }
}

// Property: a frame whose byte count disagrees with its length field never validates
proptest! {
    #[test]
    fn prop_length_mismatch_rejected(
        header in header_fields(),
        body in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        prop_assume!(header.payload_len_bytes() != body.len());

        let mut frame = header.encode().to_vec();
        frame.extend_from_slice(&body);

        let rejection = IncomingMessage::parse(Bytes::from(frame)).unwrap_err();
        prop_assert_eq!(rejection.error_code(), ErrorCode::InvalidHeader);
    }
}

// Property: rejected frames never reach the device
proptest! {
    #[test]
    fn prop_invalid_frames_skip_device(raw in prop::collection::vec(any::<u8>(), 0..64)) {
        let device = Arc::new(SimulatedDevice::new());
        let dispatcher = CommandDispatcher::new(Arc::clone(&device));

        let valid = IncomingMessage::parse_slice(&raw).is_ok();
        let reply = dispatcher.handle(Bytes::from(raw));

        if !valid {
            prop_assert_eq!(device.calls().total(), 0);
            prop_assert!(matches!(reply, Reply::Send(ref bytes) if bytes.len() == 4));
        } else {
            prop_assert!(device.calls().total() <= 1);
        }
    }
}

// Property: teardown frames with the wrong magic are always invalid-magic
proptest! {
    #[test]
    fn prop_wrong_magic_rejected(magic in any::<u32>(), session in any::<u32>()) {
        prop_assume!(magic != 0xb852_e2a4);

        let mut frame = CommandHeader::new(1, 0, 3, CommandCode::SessionTeardown.as_u16())
            .encode()
            .to_vec();
        frame.extend_from_slice(&[0; 4]);
        frame.extend_from_slice(&magic.to_le_bytes());
        frame.extend_from_slice(&session.to_le_bytes());

        let rejection = IncomingMessage::parse_slice(&frame).unwrap_err();
        prop_assert_eq!(rejection.error_code(), ErrorCode::InvalidMagic);
    }
}

// Property: responses echo the request tags and size their length field
proptest! {
    #[test]
    fn prop_response_echoes_tags(
        request in header_fields(),
        words in prop::collection::vec(any::<u32>(), 0..64),
        status in any::<i32>(),
    ) {
        let payload: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let frame = build_response(
            &request,
            &payload,
            verifier_gateway::protocol::ResponseCode::from_status(status),
        );

        let header = CommandHeader::decode_slice(&frame).unwrap();
        prop_assert_eq!(header.client, request.client);
        prop_assert_eq!(header.id, request.id);
        prop_assert_eq!(usize::from(header.length), words.len());
        prop_assert!(!header.reserved1 && !header.reserved2);
        prop_assert_eq!(&frame[4..], payload.as_slice());
    }
}
