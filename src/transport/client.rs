//! Async client that speaks the verifier wire format.
//!
//! Used by the integration tests and handy for poking a running gateway.

use crate::config::{HEADER_SIZE, WORD_SIZE};
use crate::core::header::CommandHeader;
use crate::error::{constants, GatewayError, Result};
use crate::protocol::message::encode_request;
use crate::protocol::CommandCode;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Default time to wait for a response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A response frame read from the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierResponse {
    pub header: CommandHeader,
    pub payload: Vec<u8>,
}

impl VerifierResponse {
    /// Value of the header `code` field.
    #[inline]
    pub fn code(&self) -> u16 {
        self.header.code
    }

    /// Header and payload as they appeared on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.payload);
        out
    }
}

pub struct VerifierClient {
    stream: TcpStream,
    response_timeout: Duration,
}

impl VerifierClient {
    #[instrument(skip(addr))]
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "Connected to gateway");
        Ok(Self {
            stream,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    /// Write bytes exactly as given, without framing.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Frame and send a request, then wait for its response.
    pub async fn request(
        &mut self,
        client: u8,
        id: u8,
        command: CommandCode,
        payload: &[u8],
    ) -> Result<VerifierResponse> {
        let frame = encode_request(client, id, command, payload)?;
        self.send_raw(&frame).await?;
        self.recv_response().await
    }

    /// Read one response frame.
    ///
    /// Returns [`GatewayError::ConnectionClosed`] if the gateway closed the
    /// connection instead of answering.
    pub async fn recv_response(&mut self) -> Result<VerifierResponse> {
        timeout(self.response_timeout, read_response(&mut self.stream))
            .await
            .map_err(|_| {
                debug!("{}", constants::ERR_RESPONSE_TIMEOUT);
                GatewayError::Timeout
            })?
    }

    /// Wait until the gateway closes the connection.
    ///
    /// Any bytes received in the meantime are discarded.
    pub async fn wait_closed(&mut self) -> Result<()> {
        let mut scratch = [0u8; 256];
        timeout(self.response_timeout, async {
            loop {
                match self.stream.read(&mut scratch).await {
                    Ok(0) => return Ok(()),
                    Ok(_) => continue,
                    Err(e) if is_reset(&e) => return Ok(()),
                    Err(e) => return Err(GatewayError::Io(e)),
                }
            }
        })
        .await
        .map_err(|_| GatewayError::Timeout)?
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

async fn read_response(stream: &mut TcpStream) -> Result<VerifierResponse> {
    let mut raw_header = [0u8; HEADER_SIZE];
    stream.read_exact(&mut raw_header).await.map_err(closed)?;
    let header = CommandHeader::decode(raw_header);

    let mut payload = vec![0u8; usize::from(header.length) * WORD_SIZE];
    stream.read_exact(&mut payload).await.map_err(closed)?;

    Ok(VerifierResponse { header, payload })
}

fn is_reset(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}

fn closed(e: io::Error) -> GatewayError {
    if e.kind() == io::ErrorKind::UnexpectedEof || is_reset(&e) {
        GatewayError::ConnectionClosed
    } else {
        GatewayError::Io(e)
    }
}
