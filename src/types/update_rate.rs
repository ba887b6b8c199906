//! Rate control for telemetry streams

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delivery rate requested by a stream subscriber.
///
/// The drone pushes telemetry at roughly 10Hz; consumers forwarding frames to
/// remote viewers usually want a fixed ceiling instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum UpdateRate {
    /// Every datagram, as it arrives
    Native,

    /// At most this many frames per second
    Max(u32),
}

impl UpdateRate {
    /// Minimum spacing between delivered frames, if any.
    ///
    /// `Max(0)` is treated as `Native` rather than an infinite interval.
    pub fn interval(self) -> Option<Duration> {
        match self {
            UpdateRate::Native | UpdateRate::Max(0) => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }

    /// Build a rate from a minimum spacing, as relays usually configure it.
    pub fn every(period: Duration) -> Self {
        if period.is_zero() {
            return UpdateRate::Native;
        }
        UpdateRate::Max((1.0 / period.as_secs_f64()).round().max(1.0) as u32)
    }
}
