//! Driver spawns and manages the inbound receive loops

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::bus::EventBus;
use crate::decoder::DatagramDecoder;
use crate::error::ChannelKind;
use crate::source::DatagramSource;

/// Consecutive receive errors tolerated before a loop gives up.
const MAX_ERRORS: u32 = 10;

/// Delay after the `error_count`th consecutive receive error.
///
/// Exponential: 100ms, 200ms, 400ms, ... capped at 3.2s.
pub(crate) fn receive_backoff(error_count: u32) -> Duration {
    Duration::from_millis(50 * (1 << error_count.clamp(1, 6)))
}

/// Driver runs one receive loop per push channel.
///
/// Each loop owns its source and decoder outright, so no state is shared
/// between channels. Decoded events go straight to the [`EventBus`].
pub struct Driver;

impl Driver {
    /// Spawn a receive loop that runs until the source ends, the token is
    /// cancelled, or too many consecutive receive errors occur.
    pub fn spawn<S, D>(
        channel: ChannelKind,
        source: S,
        decoder: D,
        bus: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> JoinHandle<()>
    where
        S: DatagramSource,
        D: DatagramDecoder,
    {
        tokio::spawn(async move {
            Self::receive_loop(channel, source, decoder, bus, cancel).await;
        })
    }

    async fn receive_loop<S, D>(
        channel: ChannelKind,
        mut source: S,
        mut decoder: D,
        bus: Arc<EventBus>,
        cancel: CancellationToken,
    ) where
        S: DatagramSource,
        D: DatagramDecoder,
    {
        info!(%channel, "Receive loop started");
        let mut datagrams = 0u64;
        let mut events = 0u64;
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(%channel, "Receive loop cancelled");
                    break;
                }
                result = source.next_datagram() => result,
            };

            match result {
                Ok(Some(datagram)) => {
                    datagrams += 1;
                    error_count = 0;
                    trace!(
                        %channel,
                        datagram = datagrams,
                        len = datagram.len(),
                        "Decoding datagram"
                    );

                    if let Some(event) = decoder.decode(&datagram) {
                        events += 1;
                        bus.publish(event);
                    }
                }
                Ok(None) => {
                    info!(%channel, "Datagram source ended after {} datagrams", datagrams);
                    break;
                }
                Err(e) => {
                    // ICMP errors surface on the next recv; keep going unless persistent
                    error_count += 1;
                    error!(%channel, "Receive error ({}/{}): {}", error_count, MAX_ERRORS, e);

                    if error_count >= MAX_ERRORS {
                        error!(%channel, "Too many receive errors, stopping");
                        break;
                    }

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(receive_backoff(error_count)) => {}
                    }
                }
            }
        }

        info!(%channel, datagrams, events, "Receive loop ended");
    }
}
