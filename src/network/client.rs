//! Bank client request engine
//!
//! Sends one request at a time to the server, retrying on timeout, and runs
//! the bounded listen window that follows a monitor request.

use bytes::Bytes;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::transport::{Datagram, Transport, TransportError, UdpTransport};
use super::{NetworkConfig, MONITOR_POLL_INTERVAL};
use crate::protocol::{
    check_datagram_size, decode_callback, decode_response, Callback, DecodeError, EncodeError,
    Operation, Response, HEADER_SIZE,
};

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request rejected before sending: {0}")]
    Encode(#[from] EncodeError),

    #[error("Malformed reply from server: {0}")]
    Decode(#[from] DecodeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Server unreachable: no reply after {0} attempts")]
    NoReply(u32),

    #[error("Could not resolve server address: {0}")]
    Resolve(#[source] std::io::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Engine state for the call in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    /// Request transmitted, waiting for a reply
    Sent { attempt: u32 },
    Replied,
    TimedOut { attempt: u32 },
    /// Listening for callbacks after a monitor request
    Monitoring,
}

/// Caller-owned request id sequence
///
/// Ids are never reused within a session. The server caches replies by id
/// alone, so separate sessions must not start from the same id either.
#[derive(Debug, Clone)]
pub struct RequestIds {
    next: u32,
}

impl RequestIds {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u32) -> Self {
        Self { next: first }
    }

    /// Start from the wall clock in microseconds, kept in positive `int` range
    pub fn from_clock() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_micros() as u64)
            .unwrap_or_default();
        Self::starting_at(((micros & 0x7fff_ffff) as u32).max(1))
    }

    /// Hand out the current id and advance
    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// A callback received during a monitor window
#[derive(Debug, Clone)]
pub struct MonitorUpdate {
    pub peer: SocketAddr,
    pub callback: Callback,
}

/// Why a monitor window ended
#[derive(Debug)]
pub enum MonitorEnd {
    Deadline,
    /// The update receiver was dropped
    Cancelled,
    Failed(TransportError),
}

/// Outcome of a monitor call
#[derive(Debug)]
pub struct MonitorReport {
    /// Result of the registering request/reply; the window runs either way
    pub initial: ClientResult<Response>,
    /// Callbacks delivered during the window
    pub callbacks: usize,
    pub ended_by: MonitorEnd,
}

/// Bank client
pub struct Client<T: Transport = UdpTransport> {
    /// Client configuration
    config: NetworkConfig,
    /// Resolved server address
    server_addr: SocketAddr,
    /// Datagram transport
    transport: T,
    /// Current state
    state: EngineState,
}

impl Client<UdpTransport> {
    /// Resolve the configured server and bind a UDP socket for it
    pub async fn connect(config: NetworkConfig) -> ClientResult<Self> {
        let server_addr = super::resolve_host(&config.host, config.port)
            .await
            .map_err(ClientError::Resolve)?;
        let transport = UdpTransport::bind_for(server_addr, config.timeout()).await?;

        tracing::info!("Using server {} ({}:{})", server_addr, config.host, config.port);

        Ok(Self::new(config, server_addr, transport))
    }
}

impl<T: Transport> Client<T> {
    /// Create a new client over an existing transport
    pub fn new(config: NetworkConfig, server_addr: SocketAddr, mut transport: T) -> Self {
        transport.set_timeout(config.timeout());

        Self {
            config,
            server_addr,
            transport,
            state: EngineState::Idle,
        }
    }

    /// Get the current state
    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send one request and wait for its reply, retrying on timeout
    pub async fn call(&mut self, id: u32, operation: &Operation) -> ClientResult<Response> {
        let request = self.prepare(id, operation)?;

        let result = self.transact(id, &request).await;
        self.state = EngineState::Idle;

        let datagram = result?;
        let response = decode_response(&datagram.data)?;
        if response.lossy {
            tracing::warn!("Reply to request {}: {}", id, DecodeError::InvalidEncoding);
        }

        tracing::info!(
            "Request {} ({}) answered: {} {:?}",
            id,
            operation.op_code(),
            response.status,
            response.message
        );

        Ok(response)
    }

    /// Register for updates, then listen for callbacks until `duration_ms` elapses
    ///
    /// Each callback is forwarded to `updates` in arrival order. Dropping the
    /// receiver ends the window early.
    pub async fn monitor(
        &mut self,
        id: u32,
        duration_ms: i64,
        updates: &mpsc::UnboundedSender<MonitorUpdate>,
    ) -> ClientResult<MonitorReport> {
        let request = self.prepare(id, &Operation::Monitor { duration_ms })?;

        let initial = match self.transact(id, &request).await {
            Ok(datagram) => decode_response(&datagram.data).map_err(ClientError::from),
            Err(e @ ClientError::NoReply(_)) => {
                tracing::warn!("Monitor request {} unacknowledged, listening anyway", id);
                Err(e)
            }
            Err(e) => {
                self.state = EngineState::Idle;
                return Err(e);
            }
        };

        let window = Duration::from_millis(duration_ms.max(0) as u64);
        let (callbacks, ended_by) = self.listen(window, updates).await;

        tracing::info!(
            "Monitor window for request {} closed after {} update(s): {:?}",
            id,
            callbacks,
            ended_by
        );

        Ok(MonitorReport {
            initial,
            callbacks,
            ended_by,
        })
    }

    fn prepare(&self, id: u32, operation: &Operation) -> ClientResult<Bytes> {
        let request = operation.to_request(id)?;
        check_datagram_size(request.len(), self.config.max_datagram_size)?;
        Ok(request)
    }

    /// Retry loop: the identical bytes are resent on every attempt
    async fn transact(&mut self, id: u32, request: &[u8]) -> ClientResult<Datagram> {
        let attempts = self.config.attempts();

        for attempt in 1..=attempts {
            self.state = EngineState::Sent { attempt };
            tracing::debug!(
                "Sending request {} to {} (attempt {}/{})",
                id,
                self.server_addr,
                attempt,
                attempts
            );
            self.transport.send_to(request, self.server_addr).await?;

            if let Some(datagram) = self.await_reply(id).await? {
                self.state = EngineState::Replied;
                tracing::debug!("Received {} bytes from {}", datagram.data.len(), datagram.peer);
                return Ok(datagram);
            }

            self.state = EngineState::TimedOut { attempt };
            tracing::warn!(
                "Timeout waiting for reply to request {} (attempt {}/{})",
                id,
                attempt,
                attempts
            );
        }

        Err(ClientError::NoReply(attempts))
    }

    /// Wait for one reply within the per-attempt timeout
    async fn await_reply(&mut self, id: u32) -> ClientResult<Option<Datagram>> {
        let timeout = self.config.timeout();
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            self.transport.set_timeout(remaining);
            let received = self.transport.recv_from().await;
            self.transport.set_timeout(timeout);

            let Some(datagram) = received? else {
                return Ok(None);
            };

            if !self.config.verify_reply_id {
                return Ok(Some(datagram));
            }

            // Short datagrams fall through and fail in decode
            match echoed_id(&datagram.data) {
                Some(echoed) if echoed != id => {
                    tracing::warn!("Discarding stale reply {} while waiting for {}", echoed, id);
                }
                _ => return Ok(Some(datagram)),
            }
        }
    }

    async fn listen(
        &mut self,
        window: Duration,
        updates: &mpsc::UnboundedSender<MonitorUpdate>,
    ) -> (usize, MonitorEnd) {
        let normal_timeout = self.transport.timeout();
        self.transport.set_timeout(window.min(MONITOR_POLL_INTERVAL));
        self.state = EngineState::Monitoring;

        let deadline = Instant::now() + window;
        let mut callbacks = 0;

        let ended_by = loop {
            if Instant::now() >= deadline {
                break MonitorEnd::Deadline;
            }
            if updates.is_closed() {
                break MonitorEnd::Cancelled;
            }

            match self.transport.recv_from().await {
                Ok(Some(datagram)) => {
                    let callback = decode_callback(&datagram.data);
                    if callback.lossy {
                        tracing::warn!(
                            "Callback from {}: {}",
                            datagram.peer,
                            DecodeError::InvalidEncoding
                        );
                    }
                    tracing::debug!("Update from {}: {}", datagram.peer, callback.message);

                    callbacks += 1;
                    let update = MonitorUpdate {
                        peer: datagram.peer,
                        callback,
                    };
                    if updates.send(update).is_err() {
                        break MonitorEnd::Cancelled;
                    }
                }
                // No update this tick
                Ok(None) => continue,
                Err(e) => break MonitorEnd::Failed(e),
            }
        };

        self.transport.set_timeout(normal_timeout);
        self.state = EngineState::Idle;

        (callbacks, ended_by)
    }
}

fn echoed_id(data: &[u8]) -> Option<u32> {
    if data.len() < HEADER_SIZE {
        return None;
    }
    Some(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
}
