//! Output and input registries driven together
//!
//! [`MasterBus`] is what an engine talks to: it builds both registries from
//! discovered ports and the user's [`PortSettings`], forwards transport to
//! the outputs, and applies hot-plug events to the registry of the right
//! direction.

use crate::config::PortSettings;
use crate::hotplug::PortEvent;
use crate::midi::{
    BusId, MidiError, MidiEvent, MidiMessage, PortDirection, PortHandle, PortIdentity,
    PortRegistry, Pulse, Result,
};
use log::{info, warn};

pub struct MasterBus {
    outputs: PortRegistry,
    inputs: PortRegistry,
    settings: PortSettings,
}

impl MasterBus {
    pub fn new(settings: PortSettings) -> Self {
        Self {
            outputs: PortRegistry::new(),
            inputs: PortRegistry::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &PortSettings {
        &self.settings
    }

    pub fn outputs(&self) -> &PortRegistry {
        &self.outputs
    }

    pub fn inputs(&self) -> &PortRegistry {
        &self.inputs
    }

    pub fn registry(&self, direction: PortDirection) -> &PortRegistry {
        match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        }
    }

    /// Adds a port to the registry of its direction with its configured
    /// clock or input setting.
    pub fn add_port(&self, handle: Box<dyn PortHandle>) -> Result<BusId> {
        if handle.is_input_port() {
            let inputting = self.settings.input_enabled(handle.port_name());
            self.inputs.add_input(handle, inputting)
        } else {
            let clock = self.settings.clock_for(handle.port_name());
            self.outputs.add_output(handle, clock)
        }
    }

    /// Initializes every port, then applies the configured clocks and
    /// inputs. A false result means some port is unavailable; the rest are
    /// usable.
    pub fn initialize(&self) -> bool {
        let outputs_ok = self.outputs.initialize();
        let inputs_ok = self.inputs.initialize();
        self.outputs.set_all_clocks();
        self.inputs.set_all_inputs();
        if !(outputs_ok && inputs_ok) {
            warn!("not every MIDI port could be opened");
        }
        outputs_ok && inputs_ok
    }

    /// Deactivates `client:port` in both registries.
    pub fn port_exit(&self, client: i32, port: i32) -> usize {
        self.outputs.port_exit(client, port) + self.inputs.port_exit(client, port)
    }

    /// Takes a (re)appeared port into service: drops the stale inactive slot
    /// for the same port, if any, appends the fresh handle, initializes it
    /// and applies its configured settings. Returns the new bus number.
    pub fn port_start(&self, handle: Box<dyn PortHandle>) -> Result<usize> {
        let identity = handle.identity();
        let registry = self.registry(identity.direction);
        if let Some(old_bus) = registry.replacement_port(identity.client, identity.port) {
            info!("port {} replaces stale bus {}", identity, old_bus);
        }

        let id = self.add_port(handle)?;
        let bus = registry.resolve(id).ok_or_else(|| {
            MidiError::RegistryError(format!("port {} vanished after add", identity))
        })?;
        registry.initialize_bus(bus);
        match identity.direction {
            PortDirection::Output => {
                if let Some(clock) = registry.configured_clock(bus) {
                    registry.set_clock(bus, clock);
                }
            }
            PortDirection::Input => {
                if let Some(inputting) = registry.configured_input(bus) {
                    registry.set_input(bus, inputting);
                }
            }
        }
        info!("port {} is bus {}: {}", identity, bus, registry.get_midi_bus_name(bus));
        Ok(bus)
    }

    /// Applies one hot-plug event. `open` creates a handle for a port that
    /// has appeared. Returns the bus number of a started port.
    pub fn handle_event<F>(&self, event: PortEvent, open: F) -> Option<usize>
    where
        F: FnOnce(&PortIdentity) -> Option<Box<dyn PortHandle>>,
    {
        match event {
            PortEvent::Exit(identity) => {
                self.registry(identity.direction)
                    .port_exit(identity.client, identity.port);
                None
            }
            PortEvent::Start(identity) => {
                let Some(handle) = open(&identity) else {
                    warn!("port {} appeared but could not be opened", identity);
                    return None;
                };
                match self.port_start(handle) {
                    Ok(bus) => Some(bus),
                    Err(e) => {
                        warn!("could not start port {}: {}", identity, e);
                        None
                    }
                }
            }
        }
    }

    pub fn start(&self) {
        self.outputs.start();
    }

    pub fn stop(&self) {
        self.outputs.stop();
    }

    pub fn continue_from(&self, tick: Pulse) {
        self.outputs.continue_from(tick);
    }

    pub fn init_clock(&self, tick: Pulse) {
        self.outputs.init_clock(tick);
    }

    pub fn clock(&self, tick: Pulse) {
        self.outputs.clock(tick);
    }

    pub fn play(&self, bus: usize, event: &MidiEvent, channel: u8) {
        self.outputs.play(bus, event, channel);
    }

    pub fn sysex(&self, event: &MidiEvent) {
        self.outputs.sysex(event);
    }

    pub fn poll_for_midi(&self) -> bool {
        self.inputs.poll_for_midi()
    }

    pub fn get_midi_event(&self) -> Option<(usize, MidiMessage)> {
        self.inputs.get_midi_event()
    }
}
