//! Per-datagram decoders for the push channels

use std::sync::Arc;

use crate::reassembly::Reassembler;
use crate::types::{LinkEvent, TelemetryFrame};

/// Turns inbound datagrams into link events.
///
/// Decoders never fail: malformed input yields partial results or nothing.
/// They run inside one receive loop and own whatever state they keep.
pub trait DatagramDecoder: Send + 'static {
    /// Decode one datagram, returning an event if one is complete
    fn decode(&mut self, datagram: &[u8]) -> Option<LinkEvent>;
}

/// Stateless `key:value;` telemetry decoder. Every datagram yields a frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryDecoder;

impl DatagramDecoder for TelemetryDecoder {
    fn decode(&mut self, datagram: &[u8]) -> Option<LinkEvent> {
        Some(LinkEvent::Telemetry(Arc::new(TelemetryFrame::decode(datagram))))
    }
}

impl DatagramDecoder for Reassembler {
    fn decode(&mut self, datagram: &[u8]) -> Option<LinkEvent> {
        self.push(datagram).map(|frame| LinkEvent::Video(Arc::new(frame)))
    }
}
