//! Command routing against the simulated device.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use bytes::Bytes;
use std::sync::Arc;
use verifier_gateway::core::header::CommandHeader;
use verifier_gateway::device::simulator::{
    CERTIFICATE_RESPONSE_SIZE, SIMULATED_CHIP_ID, SUBKEY_RESPONSE_SIZE,
};
use verifier_gateway::device::{
    BridgeError, BridgeReply, BridgeResult, DeviceBridge, SimulatedDevice,
};
use verifier_gateway::protocol::dispatcher::CommandDispatcher;
use verifier_gateway::protocol::message::{encode_request, session_teardown_payload};
use verifier_gateway::protocol::{CommandCode, ErrorCode};
use verifier_gateway::transport::{MessageHandler, Reply};

fn simulated() -> CommandDispatcher<SimulatedDevice> {
    CommandDispatcher::new(Arc::new(SimulatedDevice::new()))
}

fn send(dispatcher: &impl MessageHandler, frame: &[u8]) -> (CommandHeader, Vec<u8>) {
    match dispatcher.handle(Bytes::copy_from_slice(frame)) {
        Reply::Send(bytes) => {
            let header = CommandHeader::decode_slice(&bytes).expect("response has a header");
            assert_eq!(bytes.len(), 4 + header.payload_len_bytes());
            (header, bytes[4..].to_vec())
        }
        Reply::Disconnect => panic!("expected a response"),
    }
}

#[test]
fn test_chip_id_scenario() {
    let dispatcher = simulated();
    let reply = dispatcher.handle(Bytes::from_static(&[0x12, 0x00, 0x00, 0x10]));

    let mut expected = vec![0x00, 0x20, 0x00, 0x10];
    expected.extend_from_slice(&SIMULATED_CHIP_ID);
    assert_eq!(reply, Reply::Send(expected));
    assert_eq!(dispatcher.bridge().calls().chip_id, 1);
}

#[test]
fn test_session_teardown_status_is_relayed() {
    let device = Arc::new(SimulatedDevice::new().with_expected_session(1));
    let dispatcher = CommandDispatcher::new(Arc::clone(&device));

    let ok = encode_request(1, 0, CommandCode::SessionTeardown, &session_teardown_payload(1))
        .unwrap();
    let (header, payload) = send(&dispatcher, &ok);
    assert_eq!(header.code, 0);
    assert!(payload.is_empty());

    let wrong = encode_request(1, 0, CommandCode::SessionTeardown, &session_teardown_payload(2))
        .unwrap();
    let (header, _) = send(&dispatcher, &wrong);
    // status -1 keeps only its low 11 bits
    assert_eq!(header.code, 0x7FF);
    assert_eq!(device.calls().session_teardown, 2);
}

#[test]
fn test_invalid_magic_never_reaches_device() {
    let dispatcher = simulated();
    let (header, payload) = send(
        &dispatcher,
        &[
            0xd5, 0x30, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0x01, 0x00,
            0x00, 0x00,
        ],
    );
    assert_eq!(header.code, ErrorCode::InvalidMagic.as_u16());
    assert!(payload.is_empty());
    assert_eq!(dispatcher.bridge().calls().total(), 0);
}

#[test]
fn test_length_mismatch_never_reaches_device() {
    let dispatcher = simulated();
    let (header, _) = send(
        &dispatcher,
        &[
            0x82, 0x21, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xff,
        ],
    );
    assert_eq!(header.code, ErrorCode::InvalidHeader.as_u16());
    assert_eq!(dispatcher.bridge().calls().total(), 0);
    assert_eq!(dispatcher.metrics().snapshot().protocol_errors, 1);
}

#[test]
fn test_create_subkey_and_measurement() {
    let dispatcher = simulated();

    let frame = encode_request(2, 1, CommandCode::CreateAttestationSubkey, &[0u8; 16]).unwrap();
    let (header, payload) = send(&dispatcher, &frame);
    assert_eq!(header.code, 0);
    assert_eq!(payload.len(), SUBKEY_RESPONSE_SIZE);
    assert_eq!(usize::from(header.length), SUBKEY_RESPONSE_SIZE / 4);

    let frame = encode_request(2, 2, CommandCode::GetMeasurement, &[0u8; 32]).unwrap();
    let (header, payload) = send(&dispatcher, &frame);
    assert_eq!(header.code, 0);
    assert_eq!(payload.len(), 32);
    assert_eq!(header.id, 2);

    let calls = dispatcher.bridge().calls();
    assert_eq!(calls.create_attestation_subkey, 1);
    assert_eq!(calls.measurement, 1);
}

#[test]
fn test_certificate_supported() {
    let dispatcher = simulated();
    let frame = encode_request(1, 1, CommandCode::GetAttestationCertificate, &[1, 0, 0, 0]).unwrap();
    let (header, payload) = send(&dispatcher, &frame);
    assert_eq!(header.code, 0);
    assert_eq!(payload.len(), CERTIFICATE_RESPONSE_SIZE);
}

#[test]
fn test_certificate_unsupported_maps_to_unknown_command() {
    let dispatcher = CommandDispatcher::new(Arc::new(
        SimulatedDevice::new().with_certificate_support(false),
    ));
    let frame = encode_request(1, 1, CommandCode::GetAttestationCertificate, &[1, 0, 0, 0]).unwrap();
    let (header, payload) = send(&dispatcher, &frame);
    assert_eq!(header.code, ErrorCode::UnknownCommand.as_u16());
    assert!(payload.is_empty());
    assert_eq!(dispatcher.bridge().calls().attestation_certificate, 1);
}

#[test]
fn test_mailbox_commands_echo() {
    let dispatcher = simulated();
    for command in [
        CommandCode::GetIdCode,
        CommandCode::Mctp,
        CommandCode::GetDeviceIdentity,
    ] {
        let payload: &[u8] = if command == CommandCode::Mctp {
            &[0x11, 0x22, 0x33, 0x44]
        } else {
            &[]
        };
        let frame = encode_request(1, 0, command, payload).unwrap();
        let (header, echoed) = send(&dispatcher, &frame);
        assert_eq!(header.code, 0, "{command:?}");
        assert_eq!(echoed, payload);
    }
    assert_eq!(dispatcher.bridge().calls().mailbox, 3);
}

#[test]
fn test_unknown_command() {
    let dispatcher = simulated();
    let (header, payload) = send(&dispatcher, &[0x77, 0x03, 0x00, 0x1A]);
    assert_eq!(header.code, ErrorCode::UnknownCommand.as_u16());
    assert_eq!((header.client, header.id), (1, 0x0A));
    assert!(payload.is_empty());
    assert_eq!(dispatcher.bridge().calls().total(), 0);
}

#[test]
fn test_bridge_failure_disconnects() {
    let dispatcher = simulated();
    dispatcher.bridge().fail_transport(true);

    let frame = encode_request(1, 0, CommandCode::GetMeasurement, &[0u8; 4]).unwrap();
    assert_eq!(
        dispatcher.handle(Bytes::from(frame)),
        Reply::Disconnect
    );
    assert_eq!(dispatcher.metrics().snapshot().bridge_failures, 1);
}

/// Bridge returning a fixed reply for every call.
struct FixedBridge(BridgeResult<BridgeReply>);

impl DeviceBridge for FixedBridge {
    fn chip_id(&self) -> BridgeResult<BridgeReply> {
        self.0.clone()
    }

    fn session_teardown(&self, _session_id: u32) -> BridgeResult<i32> {
        self.0.clone().map(|r| r.status)
    }

    fn create_attestation_subkey(&self, _request: &[u8]) -> BridgeResult<BridgeReply> {
        self.0.clone()
    }

    fn measurement(&self, _request: &[u8]) -> BridgeResult<BridgeReply> {
        self.0.clone()
    }

    fn attestation_certificate(&self, _request: u8) -> BridgeResult<BridgeReply> {
        self.0.clone()
    }

    fn mailbox(&self, _command: CommandCode, _payload: &[u8]) -> BridgeResult<BridgeReply> {
        self.0.clone()
    }
}

#[test]
fn test_unaligned_device_payload_degrades_to_generic() {
    let dispatcher =
        CommandDispatcher::new(Arc::new(FixedBridge(Ok(BridgeReply::new(vec![1, 2, 3], 0)))));
    let reply = dispatcher.handle(Bytes::from_static(&[0x12, 0x00, 0x00, 0x10]));
    assert_eq!(reply, Reply::Send(vec![0x01, 0x00, 0x00, 0x10]));
}

#[test]
fn test_oversized_device_payload_degrades_to_generic() {
    let dispatcher = CommandDispatcher::new(Arc::new(FixedBridge(Ok(BridgeReply::new(
        vec![0x7E; 8192],
        0,
    )))));
    let (header, payload) = send(&dispatcher, &[0x12, 0x00, 0x00, 0x10]);
    assert_eq!(header.code, ErrorCode::Generic.as_u16());
    assert_eq!(header.length, 0);
    assert!(payload.is_empty());
}

#[test]
fn test_device_status_passthrough() {
    let dispatcher =
        CommandDispatcher::new(Arc::new(FixedBridge(Ok(BridgeReply::status_only(0x85)))));
    let (header, _) = send(&dispatcher, &[0x12, 0x00, 0x00, 0x10]);
    assert_eq!(header.code, 0x85);
}

#[test]
fn test_unsupported_status_only_special_for_certificates() {
    let dispatcher =
        CommandDispatcher::new(Arc::new(FixedBridge(Ok(BridgeReply::status_only(-1)))));
    let (header, _) = send(&dispatcher, &[0x12, 0x00, 0x00, 0x10]);
    assert_eq!(header.code, 0x7FF);
}

#[test]
fn test_fixed_bridge_failure() {
    let dispatcher = CommandDispatcher::new(Arc::new(FixedBridge(Err(
        BridgeError::Unavailable("no device".to_string()),
    ))));
    let reply = dispatcher.handle(Bytes::from_static(&[0x12, 0x00, 0x00, 0x10]));
    assert_eq!(reply, Reply::Disconnect);
}
