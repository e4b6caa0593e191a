//! Bounded TCP server for verifier connections.
//!
//! Each accepted connection occupies one slot in a fixed-size table and runs on
//! its own task. A single read from the socket is treated as one complete
//! message. When the whole server sees no accept, no client data and no running
//! handler for a full idle window, every open connection is closed.
//!
//! A slot stays occupied until its task has dropped the socket, so the number
//! of open client sockets never exceeds the table size.

use super::{MessageHandler, Reply};
use crate::config::ServerConfig;
use crate::error::{constants, GatewayError, Result};
use crate::utils::metrics::Metrics;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Pause after the first failed accept; doubles per consecutive failure.
const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// An occupied slot.
#[derive(Debug)]
struct Slot {
    /// Distinguishes successive occupants of the same index
    generation: u64,
    peer: SocketAddr,
    cancel: CancellationToken,
}

/// State shared between the accept loop and connection tasks.
struct Shared {
    slots: Mutex<Vec<Option<Slot>>>,
    next_generation: AtomicU64,
    /// Milliseconds since `started` at the last accept, client read or
    /// handler completion
    last_activity_ms: AtomicU64,
    /// Handlers currently executing
    in_flight: AtomicUsize,
    started: Instant,
    shutdown: CancellationToken,
    metrics: Arc<Metrics>,
}

impl Shared {
    fn slots(&self) -> MutexGuard<'_, Vec<Option<Slot>>> {
        // slot bookkeeping stays consistent even if a holder panicked
        self.slots.lock().unwrap_or_else(|poisoned| {
            error!("{}", constants::ERR_SLOT_TABLE_LOCK);
            poisoned.into_inner()
        })
    }

    fn touch(&self) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_activity_ms.store(now, Ordering::Relaxed);
    }

    fn last_activity(&self) -> Instant {
        self.started + Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed))
    }

    /// Claim the first free slot, returning its index, generation and token.
    fn claim(&self, peer: SocketAddr) -> Option<(usize, u64, CancellationToken)> {
        let mut slots = self.slots();
        let index = slots.iter().position(Option::is_none)?;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        slots[index] = Some(Slot {
            generation,
            peer,
            cancel: cancel.clone(),
        });
        Some((index, generation, cancel))
    }

    /// Free a slot if it still belongs to the given occupant.
    fn release(&self, index: usize, generation: u64) {
        let mut slots = self.slots();
        if let Some(entry) = slots.get_mut(index) {
            if entry.as_ref().map(|s| s.generation) == Some(generation) {
                *entry = None;
            }
        }
    }

    /// Ask every open connection to close, returning how many were told.
    ///
    /// `record` sees the count before any connection is woken. Slots are freed
    /// by their own tasks once the socket is dropped.
    fn close_all(&self, record: impl FnOnce(usize)) -> usize {
        let slots = self.slots();
        let open: Vec<_> = slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| Some((index, slot.as_ref()?)))
            .filter(|(_, slot)| !slot.cancel.is_cancelled())
            .collect();
        record(open.len());
        for (index, slot) in &open {
            debug!(slot = index, peer = %slot.peer, "Dropping connection");
            slot.cancel.cancel();
        }
        open.len()
    }

    fn handlers_running(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn active(&self) -> usize {
        self.slots().iter().filter(|s| s.is_some()).count()
    }
}

/// Marks a handler as running for as long as it lives.
struct InFlight(Arc<Shared>);

impl InFlight {
    fn enter(shared: Arc<Shared>) -> Self {
        shared.in_flight.fetch_add(1, Ordering::AcqRel);
        Self(shared)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        // the idle window restarts once processing ends
        self.0.touch();
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Verifier-facing TCP server.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use verifier_gateway::config::ServerConfig;
/// use verifier_gateway::device::SimulatedDevice;
/// use verifier_gateway::protocol::dispatcher::CommandDispatcher;
/// use verifier_gateway::transport::GatewayServer;
///
/// # async fn run() -> verifier_gateway::error::Result<()> {
/// let dispatcher = CommandDispatcher::new(Arc::new(SimulatedDevice::new()));
/// let server = GatewayServer::bind(ServerConfig::default(), dispatcher).await?;
/// server.run().await
/// # }
/// ```
pub struct GatewayServer<H: MessageHandler> {
    config: ServerConfig,
    handler: Arc<H>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    shared: Arc<Shared>,
}

impl<H: MessageHandler> GatewayServer<H> {
    /// Bind the listening socket described by `config`.
    #[instrument(skip(config, handler), fields(address = %config.address))]
    pub async fn bind(config: ServerConfig, handler: H) -> Result<Self> {
        Self::bind_with_metrics(config, handler, Arc::new(Metrics::new())).await
    }

    /// Bind and record into an existing metrics collector.
    pub async fn bind_with_metrics(
        config: ServerConfig,
        handler: H,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(config.address.as_str())
            .await
            .map_err(|source| {
                if source.kind() == io::ErrorKind::AddrInUse {
                    error!(address = %config.address, "{}", constants::ERR_ADDRESS_IN_USE);
                } else {
                    error!(address = %config.address, error = %source, "Bind failed");
                }
                GatewayError::Bind {
                    address: config.address.clone(),
                    source,
                }
            })?;
        let local_addr = listener.local_addr()?;

        let mut slots = Vec::with_capacity(config.max_connections);
        slots.resize_with(config.max_connections, || None);

        let shared = Arc::new(Shared {
            slots: Mutex::new(slots),
            next_generation: AtomicU64::new(0),
            last_activity_ms: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            started: Instant::now(),
            shutdown: CancellationToken::new(),
            metrics,
        });

        Ok(Self {
            config,
            handler: Arc::new(handler),
            listener: Mutex::new(Some(listener)),
            local_addr,
            shared,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of occupied connection slots.
    pub fn active_connections(&self) -> usize {
        self.shared.active()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.shared.metrics
    }

    /// Close the listener and every client connection.
    pub fn stop(&self) {
        let closed = self.shared.close_all(|_| {});
        self.shared.shutdown.cancel();
        info!(closed, "Server stopped");
    }

    /// Serve until SIGINT or SIGTERM.
    pub async fn run(&self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            wait_for_signal().await;
            info!("Signal caught, terminating");
            let _ = shutdown_tx.send(()).await;
        });

        self.run_with_shutdown(shutdown_rx).await
    }

    /// Serve until `shutdown_rx` yields or [`stop`](Self::stop) is called.
    #[instrument(skip(self, shutdown_rx), fields(address = %self.local_addr))]
    pub async fn run_with_shutdown(&self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| GatewayError::ConfigError("server is already running".to_string()))?;

        info!(
            max_connections = self.config.max_connections,
            idle_timeout_ms = self.config.idle_timeout.as_millis() as u64,
            "Server started"
        );
        self.shared.touch();
        let mut accept_failures = 0u32;

        loop {
            let idle_deadline = self.shared.last_activity() + self.config.idle_timeout;

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested");
                    self.stop();
                    return Ok(());
                }

                _ = self.shared.shutdown.cancelled() => {
                    return Ok(());
                }

                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            accept_failures = 0;
                            self.shared.touch();
                            self.admit(stream, peer);
                        }
                        Err(e) => {
                            accept_failures = accept_failures.saturating_add(1);
                            let backoff = accept_backoff(accept_failures);
                            self.shared.metrics.socket_error();
                            error!(
                                error = %e,
                                backoff_ms = backoff.as_millis() as u64,
                                "Accept failed"
                            );
                            tokio::time::sleep(backoff).await;
                        }
                    }
                }

                _ = tokio::time::sleep_until(idle_deadline) => {
                    if self.shared.handlers_running() > 0 {
                        // a message is being processed; the window cannot lapse
                        self.shared.touch();
                    } else if self.shared.last_activity().elapsed() >= self.config.idle_timeout {
                        let metrics = &self.shared.metrics;
                        let closed = self.shared.close_all(|n| metrics.idle_dropped(n as u64));
                        if closed > 0 {
                            info!(closed, "Dropping unused connections");
                        }
                        self.shared.touch();
                    }
                }
            }
        }
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        let Some((slot, generation, cancel)) = self.shared.claim(peer) else {
            self.shared.metrics.connection_rejected();
            warn!(peer = %peer, "Connection table full, dropping new connection");
            return;
        };

        self.shared.metrics.connection_established();
        info!(peer = %peer, slot, "Accepted connection");

        let connection = Connection {
            stream,
            peer,
            slot,
            generation,
            cancel,
            handler: Arc::clone(&self.handler),
            shared: Arc::clone(&self.shared),
            max_message_size: self.config.max_message_size,
        };

        tokio::spawn(connection.serve());
    }
}

impl<H: MessageHandler> Drop for GatewayServer<H> {
    fn drop(&mut self) {
        self.shared.close_all(|_| {});
        self.shared.shutdown.cancel();
    }
}

struct Connection<H: MessageHandler> {
    stream: TcpStream,
    peer: SocketAddr,
    slot: usize,
    generation: u64,
    cancel: CancellationToken,
    handler: Arc<H>,
    shared: Arc<Shared>,
    max_message_size: usize,
}

impl<H: MessageHandler> Connection<H> {
    async fn serve(mut self) {
        let mut buffer = vec![0u8; self.max_message_size];

        loop {
            let read = tokio::select! {
                _ = self.cancel.cancelled() => break,
                read = self.stream.read(&mut buffer) => read,
            };

            let len = match read {
                Ok(0) => {
                    debug!(peer = %self.peer, slot = self.slot, "Peer closed connection");
                    break;
                }
                Ok(len) => len,
                Err(e) => {
                    self.shared.metrics.socket_error();
                    error!(peer = %self.peer, error = %e, "Recv failed");
                    break;
                }
            };

            self.shared.touch();
            self.shared.metrics.message_received(len as u64);
            info!(peer = %self.peer, slot = self.slot, bytes = len, "Received message");

            let raw = Bytes::copy_from_slice(&buffer[..len]);
            let handler = Arc::clone(&self.handler);
            let running = InFlight::enter(Arc::clone(&self.shared));
            let task = tokio::task::spawn_blocking(move || {
                let _running = running;
                handler.handle(raw)
            });
            let joined = tokio::select! {
                _ = self.cancel.cancelled() => break,
                joined = task => joined,
            };
            let reply = match joined {
                Ok(reply) => reply,
                Err(e) => {
                    error!(peer = %self.peer, error = %e, "Message handler panicked");
                    break;
                }
            };

            match reply {
                Reply::Send(response) => {
                    info!(peer = %self.peer, bytes = response.len(), "Sending response");
                    let written = tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        written = self.stream.write_all(&response) => written,
                    };
                    match written {
                        Ok(()) => self.shared.metrics.response_sent(response.len() as u64),
                        Err(e) => {
                            // the connection stays up until the next read fails
                            self.shared.metrics.socket_error();
                            error!(peer = %self.peer, error = %e, "Send failed");
                        }
                    }
                }
                Reply::Disconnect => {
                    self.shared.metrics.disconnect_reply();
                    info!(peer = %self.peer, "No data to send, closing connection");
                    break;
                }
            }
        }

        drop(self.stream);
        self.shared.release(self.slot, self.generation);
        self.shared.metrics.connection_closed();
        debug!(peer = %self.peer, slot = self.slot, "Connection closed");
    }
}

/// Delay before retrying `accept` after `failures` consecutive errors.
fn accept_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1 << exponent)
        .min(ACCEPT_BACKOFF_MAX)
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Could not install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
