//! Async UDP link layer for small SDK-controlled drones.
//!
//! The drone exposes three UDP channels:
//!
//! - **Command** (port 8889): text commands, one reply datagram each
//! - **Telemetry** (port 8890): `key:value;` state datagrams pushed by the drone
//! - **Video** (port 11111): a raw H.264 stream split across datagrams
//!
//! [`DroneLink`] owns all three. It enters SDK mode, enables the video stream,
//! serializes commands so each reply is matched to the command that caused it,
//! decodes telemetry and reassembles video into frames for subscribers.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use goose_link::{Command, DroneLink, LinkConfig, UpdateRate};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let link = DroneLink::connect(LinkConfig::default()).await?;
//!     link.on_video(|frame| println!("frame {} ({} bytes)", frame.sequence, frame.len()));
//!
//!     let mut telemetry = Box::pin(link.telemetry_stream(UpdateRate::Max(10)));
//!     tokio::spawn(async move {
//!         while let Some(frame) = telemetry.next().await {
//!             println!("height: {:?}", frame.height());
//!         }
//!     });
//!
//!     link.send(Command::takeoff()).await?;
//!     link.send(Command::land()).await?;
//!     link.stop().await;
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Inbound pipeline
pub mod bus;
pub mod decoder;
pub mod driver;
pub mod reassembly;
pub mod source;
pub mod stream;

// Channels and facade
pub mod channels;
mod link;

// Core exports
pub use error::*;
pub use types::*;

pub use bus::{EventBus, EventHandler, SubscriptionId};
pub use channels::{CommandChannel, TelemetryChannel, VideoChannel};
pub use config::LinkConfig;
pub use link::{DroneLink, IntoCommand};
pub use reassembly::Reassembler;
pub use stream::ThrottleExt;
