//! Push-only telemetry channel

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::bind_socket;
use crate::Result;
use crate::bus::EventBus;
use crate::config::TelemetryConfig;
use crate::decoder::TelemetryDecoder;
use crate::driver::Driver;
use crate::error::ChannelKind;
use crate::source::UdpSource;

/// Bound telemetry socket, not yet receiving.
///
/// Datagrams arriving between [`bind`](Self::bind) and [`spawn`](Self::spawn)
/// wait in the socket's receive buffer.
pub struct TelemetryChannel {
    source: UdpSource,
}

impl TelemetryChannel {
    pub async fn bind(config: &TelemetryConfig) -> Result<Self> {
        let socket = bind_socket(ChannelKind::Telemetry, config.bind).await?;
        Ok(Self { source: UdpSource::new(socket, config.max_datagram) })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.source.local_addr()
    }

    /// Start decoding datagrams into [`TelemetryFrame`](crate::TelemetryFrame)
    /// events, one per datagram, unthrottled.
    pub fn spawn(self, bus: Arc<EventBus>, cancel: CancellationToken) -> JoinHandle<()> {
        Driver::spawn(ChannelKind::Telemetry, self.source, TelemetryDecoder, bus, cancel)
    }
}
