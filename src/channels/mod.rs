//! The three UDP channels of the drone link.
//!
//! Each channel owns its socket. [`CommandChannel`] is request/response;
//! [`TelemetryChannel`] and [`VideoChannel`] are push-only and are handed to
//! a [`Driver`](crate::driver::Driver) receive loop once the link is up.

mod command;
mod telemetry;
mod video;

#[cfg(test)]
mod tests;

pub use command::CommandChannel;
pub use telemetry::TelemetryChannel;
pub use video::VideoChannel;

use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{error, info};

use crate::error::ChannelKind;
use crate::{LinkError, Result};

/// Bind one channel's socket. Failure here is fatal for the link.
pub(crate) async fn bind_socket(channel: ChannelKind, addr: SocketAddr) -> Result<UdpSocket> {
    match UdpSocket::bind(addr).await {
        Ok(socket) => {
            let local = socket.local_addr().unwrap_or(addr);
            info!(%channel, %local, "Socket bound");
            Ok(socket)
        }
        Err(e) => {
            error!(%channel, %addr, "Failed to bind socket: {}", e);
            Err(LinkError::bind_failed(channel, addr, e))
        }
    }
}
