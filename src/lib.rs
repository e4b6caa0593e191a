//! # Verifier Gateway
//!
//! TCP gateway that lets a remote attestation verifier drive the FPGA crypto
//! service of a device.
//!
//! Verifiers send compact binary frames: a packed 32-bit little-endian header
//! followed by a word-aligned payload. The gateway validates each frame,
//! routes the command to a [`DeviceBridge`](device::DeviceBridge), and answers
//! with a frame that echoes the request's correlation tags.
//!
//! ## Layout
//! - [`core`]: header bit layout and little-endian word helpers
//! - [`protocol`]: frame validation, response framing, command dispatch
//! - [`device`]: the bridge contract and an in-process simulator
//! - [`transport`]: the bounded TCP server and a verifier client
//! - [`config`]: protocol constants and runtime configuration
//! - [`utils`]: logging setup and metrics
//!
//! ## Quick start
//! ```rust,no_run
//! use std::sync::Arc;
//! use verifier_gateway::config::GatewayConfig;
//! use verifier_gateway::device::SimulatedDevice;
//! use verifier_gateway::protocol::dispatcher::CommandDispatcher;
//! use verifier_gateway::transport::GatewayServer;
//!
//! #[tokio::main]
//! async fn main() -> verifier_gateway::error::Result<()> {
//!     let config = GatewayConfig::from_env()?;
//!     verifier_gateway::init_logging(&config);
//!
//!     let dispatcher = CommandDispatcher::new(Arc::new(SimulatedDevice::new()));
//!     let server = GatewayServer::bind(config.server, dispatcher).await?;
//!     server.run().await
//! }
//! ```

pub mod config;
pub mod core;
pub mod device;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::config::GatewayConfig;
pub use crate::core::CommandHeader;
pub use crate::device::{BridgeError, BridgeReply, DeviceBridge, SimulatedDevice};
pub use crate::error::{FrameError, GatewayError, Result};
pub use crate::protocol::dispatcher::CommandDispatcher;
pub use crate::protocol::message::IncomingMessage;
pub use crate::protocol::{CommandCode, ErrorCode};
pub use crate::transport::{GatewayServer, MessageHandler, Reply, VerifierClient};

/// Install the global tracing subscriber described by `config.logging`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(config: &GatewayConfig) {
    utils::logging::init(&config.logging);
}
