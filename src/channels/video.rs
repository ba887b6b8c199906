//! Push-only video channel

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::bind_socket;
use crate::Result;
use crate::bus::EventBus;
use crate::config::VideoConfig;
use crate::driver::Driver;
use crate::error::ChannelKind;
use crate::reassembly::Reassembler;
use crate::source::UdpSource;

/// Bound video socket plus the reassembly state that will consume it.
pub struct VideoChannel {
    source: UdpSource,
    reassembler: Reassembler,
}

impl VideoChannel {
    pub async fn bind(config: &VideoConfig) -> Result<Self> {
        let socket = bind_socket(ChannelKind::Video, config.bind).await?;
        Ok(Self {
            source: UdpSource::new(socket, config.max_datagram),
            reassembler: Reassembler::from_config(config),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.source.local_addr()
    }

    /// Start reassembling fragments into [`VideoFrame`](crate::VideoFrame)
    /// events. The reassembler moves into the receive loop and is touched by
    /// nothing else.
    pub fn spawn(self, bus: Arc<EventBus>, cancel: CancellationToken) -> JoinHandle<()> {
        Driver::spawn(ChannelKind::Video, self.source, self.reassembler, bus, cancel)
    }
}
