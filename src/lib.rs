pub mod cli;
pub mod config;
pub mod hotplug;
pub mod logging;
pub mod master_bus;
pub mod midi;

pub use crate::cli::Args;
pub use crate::config::PortSettings;
pub use hotplug::{PortEvent, PortScanner, PortWatcher};
pub use master_bus::MasterBus;
pub use midi::{BusId, ClockMode, PortHandle, PortRegistry};

/// Names of the MIDI ports available on this system
#[cfg(not(feature = "test-mock"))]
pub fn handle_port_list() -> Vec<String> {
    midi::midir_port::list_ports()
}

#[cfg(feature = "test-mock")]
pub fn handle_port_list() -> Vec<String> {
    midi::mock_port::list_devices()
}
