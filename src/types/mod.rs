//! Core types flowing through the link.
//!
//! - [`Command`] / [`CommandReply`] for the request/response control channel
//! - [`TelemetryFrame`] for decoded `key:value;` state datagrams
//! - [`VideoFrame`] for reassembled H.264 access units
//! - [`EventKind`] / [`LinkEvent`] for subscriber dispatch
//!
//! ```rust
//! use goose_link::types::TelemetryFrame;
//!
//! let frame = TelemetryFrame::decode(b"pitch:-7;roll:abc;bat:85;");
//! assert_eq!(frame.pitch(), Some(-7.0));
//! assert_eq!(frame.battery(), Some(85.0));
//! assert!(!frame.contains("roll"));
//! ```

mod command;
mod event;
mod telemetry;
mod update_rate;
mod video;

pub use command::{Command, CommandOutcome, CommandReply, FlipDirection};
pub use event::{EventKind, LinkEvent};
pub use telemetry::TelemetryFrame;
pub use update_rate::UpdateRate;
pub use video::{NalUnitType, START_CODE, VideoFrame};

pub(crate) use video::find_marker;
