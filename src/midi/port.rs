use crate::midi::event::{MidiEvent, MidiMessage, Pulse};
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// Custom error type for MIDI port operations
#[derive(Debug)]
pub enum MidiError {
    /// Error when sending a MIDI message
    SendError(String),
    /// Error when connecting to a MIDI device
    ConnectionError(String),
    /// Error when a backend port could not be opened
    InitError(String),
    /// Error while loading port settings
    ConfigError(String),
    /// Error when the registry failed to record a port
    RegistryError(String),
}

impl fmt::Display for MidiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiError::SendError(msg) => write!(f, "MIDI send error: {}", msg),
            MidiError::ConnectionError(msg) => write!(f, "MIDI connection error: {}", msg),
            MidiError::InitError(msg) => write!(f, "MIDI port init error: {}", msg),
            MidiError::ConfigError(msg) => write!(f, "MIDI settings error: {}", msg),
            MidiError::RegistryError(msg) => write!(f, "MIDI registry error: {}", msg),
        }
    }
}

impl Error for MidiError {}

impl From<midir::InitError> for MidiError {
    fn from(e: midir::InitError) -> Self {
        MidiError::InitError(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiOutput>> for MidiError {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        MidiError::ConnectionError(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiInput>> for MidiError {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        MidiError::ConnectionError(e.to_string())
    }
}

impl From<midir::SendError> for MidiError {
    fn from(e: midir::SendError) -> Self {
        MidiError::SendError(e.to_string())
    }
}

impl From<::config::ConfigError> for MidiError {
    fn from(e: ::config::ConfigError) -> Self {
        MidiError::ConfigError(e.to_string())
    }
}

/// Result type for MIDI operations
pub type Result<T> = std::result::Result<T, MidiError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    /// A port backed by a hardware (or other system) endpoint
    Normal,
    /// A software port created by this application
    Virtual,
}

/// Client/port pair announced by the system for a port, plus its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortIdentity {
    pub client: i32,
    pub port: i32,
    pub direction: PortDirection,
}

impl PortIdentity {
    pub fn new(client: i32, port: i32, direction: PortDirection) -> Self {
        Self {
            client,
            port,
            direction,
        }
    }
}

impl fmt::Display for PortIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client, self.port)
    }
}

/// How MIDI timing clock is generated for an output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    /// The port is not to be used at all
    Disabled,
    #[default]
    Off,
    /// Clock with song position, so a follower can continue mid-song
    Pos,
    /// Clock starting on the next clock-mod boundary
    #[serde(alias = "on")]
    Mod,
}

impl ClockMode {
    /// True when the mode produces clock and transport messages
    pub fn is_clocking(self) -> bool {
        matches!(self, ClockMode::Pos | ClockMode::Mod)
    }
}

impl FromStr for ClockMode {
    type Err = MidiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(ClockMode::Disabled),
            "off" => Ok(ClockMode::Off),
            "pos" => Ok(ClockMode::Pos),
            "mod" | "on" => Ok(ClockMode::Mod),
            other => Err(MidiError::ConfigError(format!(
                "unknown clock mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ClockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClockMode::Disabled => "disabled",
            ClockMode::Off => "off",
            ClockMode::Pos => "pos",
            ClockMode::Mod => "mod",
        };
        f.write_str(name)
    }
}

/// A backend MIDI endpoint as seen by the port registry.
///
/// One implementation exists per transport backend; the registry is written
/// once against this trait. Open and send primitives return a [`Result`] so
/// the backend can explain a failure, but the registry only ever logs it:
/// callers of the registry see booleans and sentinels.
pub trait PortHandle: Send {
    fn is_input_port(&self) -> bool;
    fn is_virtual_port(&self) -> bool;
    /// System ports are always considered receivable
    fn is_system_port(&self) -> bool;

    /// Opens a virtual input port.
    fn init_in_sub(&mut self) -> Result<()>;
    /// Opens a virtual output port.
    fn init_out_sub(&mut self) -> Result<()>;
    /// Opens a normal (hardware) output port.
    fn init_out(&mut self) -> Result<()>;

    fn set_clock(&mut self, mode: ClockMode);
    fn clock_mode(&self) -> ClockMode;

    /// Enables or disables input, opening or closing the backend stream as
    /// needed.
    fn set_input(&mut self, inputting: bool) -> Result<()>;
    fn input_enabled(&self) -> bool;

    /// Non-blocking check for pending input data.
    fn poll_for_midi(&mut self) -> bool;

    /// Pulls one pending input message, if any.
    fn get_midi_event(&mut self) -> Option<MidiMessage> {
        None
    }

    fn matches(&self, client: i32, port: i32) -> bool {
        self.bus_id() == client && self.port_id() == port
    }

    fn bus_name(&self) -> &str;
    fn port_name(&self) -> &str;
    fn display_name(&self) -> String;
    fn bus_id(&self) -> i32;
    fn port_id(&self) -> i32;

    fn identity(&self) -> PortIdentity {
        let direction = if self.is_input_port() {
            PortDirection::Input
        } else {
            PortDirection::Output
        };
        PortIdentity::new(self.bus_id(), self.port_id(), direction)
    }

    /// Sends one event on the given channel.
    fn play(&mut self, event: &MidiEvent, channel: u8) -> Result<()>;
    fn sysex(&mut self, event: &MidiEvent) -> Result<()>;

    fn start(&mut self);
    fn stop(&mut self);
    fn continue_from(&mut self, tick: Pulse);
    fn init_clock(&mut self, tick: Pulse);
    fn clock(&mut self, tick: Pulse);

    /// Graceful shutdown, invoked before the handle is dropped.
    fn close(&mut self) {}
}
