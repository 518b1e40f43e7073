//! MIDI port management for midibusrs
//!
//! This module provides the port registry and its collaborators:
//! - [`PortHandle`], the contract every backend port implements
//! - [`PortRecord`], registry-side state for one port
//! - [`PortRegistry`], the bus-numbered collection of ports
//! - [`ClockState`] for turning sequencer ticks into MIDI clock
//! - [`MidirPort`] for real MIDI devices via midir
//! - [`MockPort`] for testing
//!
mod clock;
mod event;
pub mod midir_port;
pub mod mock_port;
mod port;
mod record;
mod registry;

pub use clock::{ClockState, CLOCKS_PER_QUARTER, DEFAULT_CLOCK_MOD, DEFAULT_PPQN};
pub use event::{MidiEvent, MidiMessage, Pulse};
pub use port::{
    ClockMode, MidiError, PortDirection, PortHandle, PortIdentity, PortKind, Result,
};
pub use record::PortRecord;
pub use registry::{BusId, PortRegistry, MAX_BUS_NAME_LEN};

pub use midir_port::{MidirPort, MidirScanner, PortOptions};
pub use mock_port::{MockLog, MockLogHandle, MockPort, TransportCall};
