//! Datagram transport used by the request engine
//!
//! The engine only needs send-to, receive-with-timeout and a settable
//! timeout, so anything offering those can stand in for the UDP socket.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;

/// Receive buffer size, large enough for any UDP datagram
const RECV_BUFFER_SIZE: usize = 65535;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to bind local socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("Send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("Receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// One inbound datagram and the address it came from
#[derive(Debug, Clone)]
pub struct Datagram {
    pub data: Bytes,
    pub peer: SocketAddr,
}

/// Unreliable datagram transport
#[async_trait]
pub trait Transport: Send {
    /// Transmit one datagram
    async fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> TransportResult<()>;

    /// Wait up to the current timeout for one datagram.
    /// Returns `Ok(None)` when the timeout elapses.
    async fn recv_from(&mut self) -> TransportResult<Option<Datagram>>;

    /// Set the timeout applied to every subsequent receive
    fn set_timeout(&mut self, timeout: Duration);

    /// Current receive timeout
    fn timeout(&self) -> Duration;
}

/// UDP transport bound to an ephemeral local port
pub struct UdpTransport {
    socket: UdpSocket,
    timeout: Duration,
    recv_buf: Vec<u8>,
}

impl UdpTransport {
    /// Bind an ephemeral port in the same address family as `server`
    pub async fn bind_for(server: SocketAddr, timeout: Duration) -> TransportResult<Self> {
        let local: SocketAddr = match server {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await.map_err(TransportError::Bind)?;

        tracing::debug!(
            "Bound UDP socket {} for server {}",
            socket.local_addr().map_err(TransportError::Bind)?,
            server
        );

        Ok(Self {
            socket,
            timeout,
            recv_buf: vec![0u8; RECV_BUFFER_SIZE],
        })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> TransportResult<()> {
        let sent = self
            .socket
            .send_to(buf, addr)
            .await
            .map_err(TransportError::SendFailed)?;
        tracing::trace!("Sent {} bytes to {}", sent, addr);
        Ok(())
    }

    async fn recv_from(&mut self) -> TransportResult<Option<Datagram>> {
        match tokio::time::timeout(self.timeout, self.socket.recv_from(&mut self.recv_buf)).await {
            Ok(Ok((n, peer))) => Ok(Some(Datagram {
                data: Bytes::copy_from_slice(&self.recv_buf[..n]),
                peer,
            })),
            Ok(Err(e)) => Err(TransportError::ReceiveFailed(e)),
            Err(_) => Ok(None),
        }
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_send_and_receive() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer.local_addr().unwrap();

        let mut transport = UdpTransport::bind_for(peer_addr, Duration::from_secs(2))
            .await
            .unwrap();
        transport.send_to(b"ping", peer_addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");

        peer.send_to(b"pong", from).await.unwrap();
        let datagram = transport.recv_from().await.unwrap().unwrap();
        assert_eq!(&datagram.data[..], b"pong");
        assert_eq!(datagram.peer, peer_addr);
    }

    #[tokio::test]
    async fn test_udp_receive_timeout() {
        let peer_addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let mut transport = UdpTransport::bind_for(peer_addr, Duration::from_millis(20))
            .await
            .unwrap();

        assert!(transport.recv_from().await.unwrap().is_none());

        transport.set_timeout(Duration::from_millis(5));
        assert_eq!(transport.timeout(), Duration::from_millis(5));
    }
}
