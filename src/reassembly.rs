//! Video fragment reassembly.
//!
//! The drone pushes its H.264 Annex-B elementary stream as raw UDP datagrams
//! with no length prefix and no frame-boundary field. Datagram boundaries do
//! not line up with frame boundaries, but each coded picture arrives as a
//! fixed number of start-code-delimited segments. The [`Reassembler`] counts
//! datagrams that contain a start code and emits everything buffered once the
//! configured count is reached.
//!
//! Per datagram `d`:
//!
//! 1. Find the first start code in `d`.
//! 2. If there is none, or nothing is buffered yet, buffer all of `d`.
//! 3. Otherwise buffer the bytes before the start code and count a boundary.
//! 4. On reaching the threshold, emit the concatenation and reset.
//! 5. Buffer the rest of `d`, start code included.
//!
//! Truncated or corrupt datagrams are absorbed like any other and only degrade
//! the frame they end up in.

use tracing::trace;

use crate::config::VideoConfig;
use crate::types::{START_CODE, VideoFrame, find_marker};

/// Fragment buffer plus boundary counter for one video stream.
#[derive(Debug)]
pub struct Reassembler {
    pending: Vec<Vec<u8>>,
    boundaries: u32,
    threshold: u32,
    start_code: Vec<u8>,
    emitted: u64,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Reassembler {
    /// Reassembler using the Annex-B start code. A threshold of zero is
    /// treated as one.
    pub fn new(threshold: u32) -> Self {
        Self::with_start_code(threshold, START_CODE.to_vec())
    }

    pub fn with_start_code(threshold: u32, start_code: Vec<u8>) -> Self {
        Self {
            pending: Vec::new(),
            boundaries: 0,
            threshold: threshold.max(1),
            start_code,
            emitted: 0,
        }
    }

    pub fn from_config(config: &VideoConfig) -> Self {
        Self::with_start_code(config.group_threshold, config.start_code.clone())
    }

    /// Feed one datagram, returning a frame if it completed a group.
    pub fn push(&mut self, datagram: &[u8]) -> Option<VideoFrame> {
        let split = match find_marker(datagram, &self.start_code) {
            Some(index) if !self.pending.is_empty() => index,
            _ => {
                self.pending.push(datagram.to_vec());
                return None;
            }
        };

        let (head, tail) = datagram.split_at(split);
        self.pending.push(head.to_vec());
        self.boundaries += 1;

        let frame = if self.boundaries >= self.threshold {
            let frame = VideoFrame::new(self.pending.concat(), self.emitted);
            self.pending.clear();
            self.boundaries = 0;
            self.emitted += 1;
            trace!(sequence = frame.sequence, bytes = frame.len(), "Video frame reassembled");
            Some(frame)
        } else {
            None
        };

        self.pending.push(tail.to_vec());
        frame
    }

    /// Number of buffered fragments, including empty prefixes.
    pub fn pending_fragments(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending.iter().map(Vec::len).sum()
    }

    /// Boundaries counted towards the next frame.
    pub fn boundary_count(&self) -> u32 {
        self.boundaries
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Frames emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Drop all buffered data, e.g. after the stream was restarted.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.boundaries = 0;
    }
}
