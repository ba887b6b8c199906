//! Event kinds published by the link

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{TelemetryFrame, VideoFrame};

/// The kinds of inbound events a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum EventKind {
    Telemetry,
    Video,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Telemetry, EventKind::Video];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Telemetry => "telemetry",
            EventKind::Video => "video",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event delivered to subscribers.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    Telemetry(Arc<TelemetryFrame>),
    Video(Arc<VideoFrame>),
}

impl LinkEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LinkEvent::Telemetry(_) => EventKind::Telemetry,
            LinkEvent::Video(_) => EventKind::Video,
        }
    }

    pub fn as_telemetry(&self) -> Option<&TelemetryFrame> {
        match self {
            LinkEvent::Telemetry(frame) => Some(frame),
            LinkEvent::Video(_) => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoFrame> {
        match self {
            LinkEvent::Video(frame) => Some(frame),
            LinkEvent::Telemetry(_) => None,
        }
    }
}
