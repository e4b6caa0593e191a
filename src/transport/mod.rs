//! # Transport Layer
//!
//! TCP plumbing between verifiers and the gateway.
//!
//! - [`server::GatewayServer`]: bounded connection multiplexer. Each read from a
//!   client is one complete message, handed to a [`MessageHandler`].
//! - [`client::VerifierClient`]: minimal async client speaking the verifier
//!   wire format, used by tests and tooling.

pub mod client;
pub mod server;

use bytes::Bytes;

pub use client::{VerifierClient, VerifierResponse};
pub use server::GatewayServer;

/// What the server should do after a message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Write these bytes back to the client.
    Send(Vec<u8>),
    /// Write nothing and close the connection.
    Disconnect,
}

/// Callback invoked by the server for every inbound message.
///
/// Called from a blocking-capable thread, so implementations may perform
/// synchronous device I/O.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, raw: Bytes) -> Reply;
}
