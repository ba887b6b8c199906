//! Error types for the drone link.
//!
//! Command failures propagate to the caller of [`send`](crate::DroneLink::send)
//! only. Telemetry decode problems and degraded video reassembly never surface
//! as errors: they show up as omitted keys or imperfect frames and are logged
//! at `trace`/`debug` level instead.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use goose_link::LinkError;
//! use std::time::Duration;
//!
//! let error = LinkError::timeout("takeoff", Duration::from_secs(3));
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;


/// Result type alias for link operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Which UDP channel an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Command,
    Telemetry,
    Video,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Command => f.write_str("command"),
            ChannelKind::Telemetry => f.write_str("telemetry"),
            ChannelKind::Video => f.write_str("video"),
        }
    }
}

/// Main error type for link operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LinkError {
    #[error("Command '{command}' timed out after {duration:?}")]
    Timeout { command: String, duration: Duration },

    #[error("Failed to bind {channel} socket on {addr}")]
    Bind {
        channel: ChannelKind,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {context}")]
    Transport {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Startup step '{step}' failed")]
    Handshake {
        step: String,
        #[source]
        source: Box<LinkError>,
    },

    #[error("Drone rejected '{command}': {reply}")]
    Rejected { command: String, reply: String },

    #[error("Command channel busy: '{pending}' is still awaiting a reply")]
    Busy { pending: String },

    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error("Link is not running")]
    NotStarted,

    #[error("Command channel closed before '{command}' resolved")]
    ChannelClosed { command: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

impl LinkError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// None of the retryable errors invalidate the channel they came from.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::Timeout { .. } => true,
            LinkError::Transport { .. } => true,
            LinkError::Busy { .. } => true,
            LinkError::Rejected { .. } => true,
            LinkError::Handshake { .. } => true,
            LinkError::Bind { .. } => false,
            LinkError::InvalidCommand { .. } => false,
            LinkError::NotStarted => false,
            LinkError::ChannelClosed { .. } => false,
            LinkError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LinkError::Timeout { .. } => vec![
                "Check that the host is joined to the drone's Wi-Fi network",
                "Retry the command",
                "Increase the command timeout",
            ],
            LinkError::Bind { .. } => vec![
                "Make sure no other process is bound to the port",
                "Configure a different local bind address",
            ],
            LinkError::Transport { .. } => vec![
                "Check the network route to the drone",
                "Retry the operation",
            ],
            LinkError::Handshake { .. } => vec![
                "Power-cycle the drone and reconnect to its network",
                "Verify the drone host address in the configuration",
                "Start the link again",
            ],
            LinkError::Rejected { .. } => vec![
                "Check the drone's battery and flight state",
                "Verify the command syntax and argument ranges",
            ],
            LinkError::Busy { .. } => vec![
                "Wait for the outstanding command to resolve",
                "Use send() to queue instead of try_send()",
            ],
            LinkError::InvalidCommand { .. } => {
                vec!["Commands must be non-empty printable ASCII", "Check argument ranges"]
            }
            LinkError::NotStarted => vec!["Call start() before sending commands"],
            LinkError::ChannelClosed { .. } => {
                vec!["The link was stopped while the command was in flight; start it again"]
            }
            LinkError::Config { .. } => {
                vec!["Check the configuration file against the documented defaults"]
            }
        }
    }

    /// Helper constructor for command timeouts.
    pub fn timeout(command: impl Into<String>, duration: Duration) -> Self {
        LinkError::Timeout { command: command.into(), duration }
    }

    /// Helper constructor for socket bind failures.
    pub fn bind_failed(channel: ChannelKind, addr: SocketAddr, source: std::io::Error) -> Self {
        LinkError::Bind { channel, addr, source }
    }

    /// Helper constructor for transport failures.
    pub fn transport(context: impl Into<String>, source: std::io::Error) -> Self {
        LinkError::Transport { context: context.into(), source }
    }

    /// Helper constructor for a failed startup step.
    pub fn handshake(step: impl Into<String>, source: LinkError) -> Self {
        LinkError::Handshake { step: step.into(), source: Box::new(source) }
    }

    /// Helper constructor for invalid commands.
    pub fn invalid_command(reason: impl Into<String>) -> Self {
        LinkError::InvalidCommand { reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        LinkError::Config { reason: reason.into() }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Transport { context: "socket I/O".to_string(), source: err }
    }
}
