//! Text commands and their replies.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{LinkError, Result};

/// A single text command for the drone's control port.
///
/// Commands are validated at construction: they must be non-empty printable
/// ASCII. The wire form is the command text without any terminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Command(String);

/// Flip direction for [`Command::flip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Left,
    Right,
    Forward,
    Back,
}

impl FlipDirection {
    fn as_char(self) -> char {
        match self {
            FlipDirection::Left => 'l',
            FlipDirection::Right => 'r',
            FlipDirection::Forward => 'f',
            FlipDirection::Back => 'b',
        }
    }
}

impl Command {
    /// Validate and wrap raw command text.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(LinkError::invalid_command("command is empty"));
        }
        if let Some(ch) = text.chars().find(|c| !c.is_ascii() || c.is_ascii_control()) {
            return Err(LinkError::invalid_command(format!(
                "'{}' contains non-printable character {:?}",
                text.escape_default(),
                ch
            )));
        }
        Ok(Self(text))
    }

    /// Enter SDK mode. Must be the first command of every session.
    pub fn sdk_mode() -> Self {
        Self("command".into())
    }

    pub fn takeoff() -> Self {
        Self("takeoff".into())
    }

    pub fn land() -> Self {
        Self("land".into())
    }

    /// Stop all motors immediately.
    pub fn emergency() -> Self {
        Self("emergency".into())
    }

    pub fn stream_on() -> Self {
        Self("streamon".into())
    }

    pub fn stream_off() -> Self {
        Self("streamoff".into())
    }

    pub fn up(cm: u32) -> Result<Self> {
        Self::movement("up", cm)
    }

    pub fn down(cm: u32) -> Result<Self> {
        Self::movement("down", cm)
    }

    pub fn left(cm: u32) -> Result<Self> {
        Self::movement("left", cm)
    }

    pub fn right(cm: u32) -> Result<Self> {
        Self::movement("right", cm)
    }

    pub fn forward(cm: u32) -> Result<Self> {
        Self::movement("forward", cm)
    }

    pub fn back(cm: u32) -> Result<Self> {
        Self::movement("back", cm)
    }

    /// Rotate clockwise, 1..=3600 degrees.
    pub fn clockwise(degrees: u32) -> Result<Self> {
        Self::ranged("cw", degrees, 1..=3600)
    }

    /// Rotate counter-clockwise, 1..=3600 degrees.
    pub fn counter_clockwise(degrees: u32) -> Result<Self> {
        Self::ranged("ccw", degrees, 1..=3600)
    }

    pub fn flip(direction: FlipDirection) -> Self {
        Self(format!("flip {}", direction.as_char()))
    }

    /// Set forward speed, 10..=100 cm/s.
    pub fn speed(cm_per_sec: u32) -> Result<Self> {
        Self::ranged("speed", cm_per_sec, 10..=100)
    }

    /// Remote-control stick values, each in -100..=100.
    pub fn rc(left_right: i32, forward_back: i32, up_down: i32, yaw: i32) -> Result<Self> {
        for value in [left_right, forward_back, up_down, yaw] {
            if !(-100..=100).contains(&value) {
                return Err(LinkError::invalid_command(format!(
                    "rc channel value {value} outside -100..=100"
                )));
            }
        }
        Ok(Self(format!("rc {left_right} {forward_back} {up_down} {yaw}")))
    }

    pub fn battery_query() -> Self {
        Self("battery?".into())
    }

    pub fn speed_query() -> Self {
        Self("speed?".into())
    }

    pub fn flight_time_query() -> Self {
        Self("time?".into())
    }

    /// Movement distance in centimetres, 20..=500.
    fn movement(verb: &str, cm: u32) -> Result<Self> {
        Self::ranged(verb, cm, 20..=500)
    }

    fn ranged(verb: &str, value: u32, range: std::ops::RangeInclusive<u32>) -> Result<Self> {
        if !range.contains(&value) {
            return Err(LinkError::invalid_command(format!(
                "{verb} argument {value} outside {}..={}",
                range.start(),
                range.end()
            )));
        }
        Ok(Self(format!("{verb} {value}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Command {
    type Error = LinkError;

    fn try_from(value: String) -> Result<Self> {
        Command::new(value)
    }
}

impl TryFrom<&str> for Command {
    type Error = LinkError;

    fn try_from(value: &str) -> Result<Self> {
        Command::new(value)
    }
}

impl From<Command> for String {
    fn from(command: Command) -> Self {
        command.0
    }
}

/// Trimmed reply payload received for a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct CommandReply(String);

impl CommandReply {
    /// Decode a raw reply datagram: lossy UTF-8, surrounding whitespace trimmed.
    pub fn from_datagram(datagram: &[u8]) -> Self {
        Self(String::from_utf8_lossy(datagram).trim().to_string())
    }

    /// Whether the drone acknowledged the command with `ok`.
    pub fn is_ok(&self) -> bool {
        self.0.eq_ignore_ascii_case("ok")
    }

    /// Whether the drone answered with an error status.
    pub fn is_error(&self) -> bool {
        self.0.to_ascii_lowercase().starts_with("error")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one command submission, resolved exactly once.
pub type CommandOutcome = Result<CommandReply>;
