//! Datagram sources feeding the receive loops

use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::trace;

use crate::Result;

/// A source of inbound datagrams.
///
/// The receive loop owns its source exclusively. Production code reads from a
/// bound UDP socket; tests can substitute an in-memory queue.
#[async_trait::async_trait]
pub trait DatagramSource: Send + 'static {
    /// Wait for the next datagram
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` - One complete datagram payload
    /// - `Ok(None)` - The source is exhausted (normal termination)
    /// - `Err(e)` - Receive failed; the loop may retry
    async fn next_datagram(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Reads datagrams from a bound UDP socket.
pub struct UdpSource {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpSource {
    /// Wrap a bound socket; datagrams longer than `max_datagram` are truncated.
    pub fn new(socket: UdpSocket, max_datagram: usize) -> Self {
        Self { socket, buf: vec![0; max_datagram.max(1)] }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait::async_trait]
impl DatagramSource for UdpSource {
    async fn next_datagram(&mut self) -> Result<Option<Vec<u8>>> {
        let (len, from) = self.socket.recv_from(&mut self.buf).await?;
        trace!(%from, len, "Datagram received");
        Ok(Some(self.buf[..len].to_vec()))
    }
}
