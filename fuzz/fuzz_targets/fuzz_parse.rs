#![no_main]

use libfuzzer_sys::fuzz_target;
use verifier_gateway::protocol::message::IncomingMessage;
use verifier_gateway::protocol::ErrorCode;

fuzz_target!(|data: &[u8]| {
    // Validation must never panic, whatever the input
    match IncomingMessage::parse_slice(data) {
        Ok(msg) => {
            let _ = msg.try_session_id();
            let _ = msg.try_certificate_request();
            let _ = msg.response(msg.payload(), ErrorCode::None);
        }
        Err(rejection) => {
            assert_eq!(rejection.response().len(), 4);
        }
    }
});
