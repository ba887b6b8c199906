//! Link configuration.
//!
//! All values default to the drone's documented addressing, so
//! `LinkConfig::default()` is enough for a drone in station-less mode. The
//! video grouping threshold and start code are observed protocol behaviour
//! rather than documented constants, so they live here instead of in code.
//!
//! ```rust
//! use goose_link::LinkConfig;
//!
//! let config = LinkConfig::from_yaml_str(
//!     r#"
//! drone_host: 10.0.0.42
//! command:
//!   timeout_ms: 5000
//! video:
//!   group_threshold: 4
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.command_target().port(), 8889);
//! assert_eq!(config.video.group_threshold, 4);
//! ```

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::types::START_CODE;
use crate::{LinkError, Result};

pub const DEFAULT_DRONE_HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 10, 1));
pub const COMMAND_PORT: u16 = 8889;
pub const TELEMETRY_PORT: u16 = 8890;
pub const VIDEO_PORT: u16 = 11111;

/// Top-level link configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Address of the drone on its access-point network
    pub drone_host: IpAddr,

    pub command: CommandConfig,

    pub telemetry: TelemetryConfig,

    pub video: VideoConfig,
}

/// Control channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandConfig {
    /// Local bind address for the control socket
    pub bind: SocketAddr,

    /// Remote control port on the drone
    pub port: u16,

    /// Reply deadline per command, in milliseconds
    pub timeout_ms: u64,
}

/// Telemetry channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub bind: SocketAddr,

    /// Receive buffer size; telemetry datagrams are well under 512 bytes
    pub max_datagram: usize,
}

/// Video channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VideoConfig {
    pub bind: SocketAddr,

    pub max_datagram: usize,

    /// Number of start-code crossings that make up one emitted frame
    pub group_threshold: u32,

    /// Marker that delimits fragment groups
    pub start_code: Vec<u8>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            drone_host: DEFAULT_DRONE_HOST,
            command: CommandConfig::default(),
            telemetry: TelemetryConfig::default(),
            video: VideoConfig::default(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self { bind: any_addr(COMMAND_PORT), port: COMMAND_PORT, timeout_ms: 3_000 }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { bind: any_addr(TELEMETRY_PORT), max_datagram: 1_518 }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            bind: any_addr(VIDEO_PORT),
            max_datagram: 2_048,
            group_threshold: 3,
            start_code: START_CODE.to_vec(),
        }
    }
}

fn any_addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
}

impl LinkConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: LinkConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| LinkError::config(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| LinkError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml_str(&yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).map_err(|e| LinkError::config(e.to_string()))
    }

    /// Reject settings the link cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.command.timeout_ms == 0 {
            return Err(LinkError::config("command.timeout_ms must be greater than zero"));
        }
        if self.video.group_threshold == 0 {
            return Err(LinkError::config("video.group_threshold must be at least 1"));
        }
        if self.video.start_code.is_empty() {
            return Err(LinkError::config("video.start_code must not be empty"));
        }
        if self.telemetry.max_datagram == 0 || self.video.max_datagram == 0 {
            return Err(LinkError::config("max_datagram must be greater than zero"));
        }
        Ok(())
    }

    /// Where commands are sent.
    pub fn command_target(&self) -> SocketAddr {
        SocketAddr::new(self.drone_host, self.command.port)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command.timeout_ms)
    }
}
