//! Routes validated verifier commands to the device bridge.
//!
//! Every inbound frame produces at most one outbound frame. A bridge
//! transport failure produces none and asks the server to drop the
//! connection.

use crate::device::{BridgeReply, BridgeResult, DeviceBridge};
use crate::protocol::message::IncomingMessage;
use crate::protocol::{CommandCode, ErrorCode, ResponseCode};
use crate::transport::{MessageHandler, Reply};
use crate::utils::metrics::{Metrics, Timer};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// [`MessageHandler`] that serves verifier requests from a [`DeviceBridge`].
pub struct CommandDispatcher<B: DeviceBridge> {
    bridge: Arc<B>,
    metrics: Arc<Metrics>,
}

impl<B: DeviceBridge> Clone for CommandDispatcher<B> {
    fn clone(&self) -> Self {
        Self {
            bridge: Arc::clone(&self.bridge),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<B: DeviceBridge> CommandDispatcher<B> {
    pub fn new(bridge: Arc<B>) -> Self {
        Self::with_metrics(bridge, Arc::new(Metrics::new()))
    }

    /// Share a metrics collector with the server.
    pub fn with_metrics(bridge: Arc<B>, metrics: Arc<Metrics>) -> Self {
        Self { bridge, metrics }
    }

    pub fn bridge(&self) -> &Arc<B> {
        &self.bridge
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Process one complete frame.
    pub fn dispatch(&self, raw: Bytes) -> Reply {
        let _timer = Timer::start("dispatch");

        let message = match IncomingMessage::parse(raw) {
            Ok(message) => message,
            Err(rejection) => {
                self.metrics.protocol_error();
                error!(
                    error = %rejection,
                    code = rejection.error_code().as_u16(),
                    "Couldn't parse incoming message"
                );
                return Reply::Send(rejection.response());
            }
        };

        let command = message.command();
        debug!(
            command = ?command,
            client = message.header().client,
            id = message.header().id,
            bytes = message.payload().len(),
            "Dispatching command"
        );

        let outcome = match command {
            CommandCode::GetChipId => self.bridge.chip_id(),
            CommandCode::SessionTeardown => self
                .bridge
                .session_teardown(message.session_id())
                .map(BridgeReply::status_only),
            CommandCode::CreateAttestationSubkey => {
                self.bridge.create_attestation_subkey(message.payload())
            }
            CommandCode::GetMeasurement => self.bridge.measurement(message.payload()),
            CommandCode::GetAttestationCertificate => {
                match self
                    .bridge
                    .attestation_certificate(message.certificate_request())
                {
                    Ok(reply) if reply.is_unsupported() => {
                        warn!(
                            request = message.certificate_request(),
                            "Certificate request not supported by device"
                        );
                        return Reply::Send(message.empty_response(ErrorCode::UnknownCommand));
                    }
                    other => other,
                }
            }
            CommandCode::GetIdCode | CommandCode::Mctp | CommandCode::GetDeviceIdentity => {
                self.bridge.mailbox(command, message.payload())
            }
            CommandCode::Unknown(code) => {
                info!(code, "Command code not recognized");
                return Reply::Send(message.empty_response(ErrorCode::UnknownCommand));
            }
        };

        self.finish(&message, outcome)
    }

    fn finish(&self, message: &IncomingMessage, outcome: BridgeResult<BridgeReply>) -> Reply {
        match outcome {
            Ok(reply) => {
                debug!(
                    status = reply.status,
                    bytes = reply.payload.len(),
                    "Preparing response"
                );
                Reply::Send(message.response(&reply.payload, ResponseCode::from_status(reply.status)))
            }
            Err(e) => {
                // no response; the connection is dropped like the device console does
                self.metrics.bridge_failure();
                error!(error = %e, command = ?message.command(), "Device call failed");
                Reply::Disconnect
            }
        }
    }
}

impl<B: DeviceBridge> MessageHandler for CommandDispatcher<B> {
    fn handle(&self, raw: Bytes) -> Reply {
        self.dispatch(raw)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::device::SimulatedDevice;

    fn dispatcher() -> CommandDispatcher<SimulatedDevice> {
        CommandDispatcher::new(Arc::new(SimulatedDevice::new()))
    }

    #[test]
    fn rejected_frames_are_counted() {
        let dispatcher = dispatcher();
        let reply = dispatcher.dispatch(Bytes::from_static(&[0x12, 0x00, 0x00]));
        assert_eq!(reply, Reply::Send(vec![0x04, 0x00, 0x00, 0x00]));
        assert_eq!(dispatcher.metrics().snapshot().protocol_errors, 1);
        assert_eq!(dispatcher.bridge().calls().total(), 0);
    }

    #[test]
    fn bridge_failure_disconnects() {
        let dispatcher = dispatcher();
        dispatcher.bridge().fail_transport(true);
        let reply = dispatcher.dispatch(Bytes::from_static(&[0x12, 0x00, 0x00, 0x10]));
        assert_eq!(reply, Reply::Disconnect);
        assert_eq!(dispatcher.metrics().snapshot().bridge_failures, 1);
    }
}
