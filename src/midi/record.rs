//! Registry-side state for a single MIDI port
//!
//! A [`PortRecord`] owns one backend [`PortHandle`] and tracks three things
//! the backend does not: whether the port is usable (`active`), whether an
//! initialization attempt has settled (`initialized`), and the clock and
//! input settings the user wants for it. The settings survive deactivation
//! so they can be reapplied when the port comes back.

use crate::midi::event::{MidiEvent, Pulse};
use crate::midi::port::{ClockMode, PortHandle};
use log::{debug, error, warn};

#[derive(Default)]
pub struct PortRecord {
    handle: Option<Box<dyn PortHandle>>,
    active: bool,
    initialized: bool,
    configured_clock: ClockMode,
    configured_input: bool,
}

impl PortRecord {
    pub fn new(handle: Box<dyn PortHandle>) -> Self {
        Self {
            handle: Some(handle),
            active: false,
            initialized: false,
            configured_clock: ClockMode::Off,
            configured_input: false,
        }
    }

    pub fn handle(&self) -> Option<&dyn PortHandle> {
        self.handle.as_deref()
    }

    pub fn handle_mut(&mut self) -> Option<&mut (dyn PortHandle + 'static)> {
        self.handle.as_deref_mut()
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn configured_clock(&self) -> ClockMode {
        self.configured_clock
    }

    pub fn set_configured_clock(&mut self, mode: ClockMode) {
        self.configured_clock = mode;
    }

    pub fn configured_input(&self) -> bool {
        self.configured_input
    }

    pub fn set_configured_input(&mut self, inputting: bool) {
        self.configured_input = inputting;
    }

    /// Marks the port usable. A record without a handle is never activated.
    pub fn activate(&mut self) {
        if self.handle.is_none() {
            warn!("refusing to activate a port record without a handle");
            return;
        }
        self.active = true;
        self.initialized = true;
    }

    /// Marks the port unusable. `initialized` is left as it was.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Settles the port according to its kind and direction.
    ///
    /// Virtual ports are always activated, whatever their open call
    /// returns. Hardware inputs are activated without opening anything;
    /// whether they deliver data is decided later by the input flag.
    /// Hardware outputs must open successfully to become active, but a
    /// failed open still marks the record initialized, which is how a
    /// disconnected port is told apart from one never attempted.
    ///
    /// Returns false for a missing handle or a failed open.
    pub fn initialize(&mut self) -> bool {
        let Some(handle) = self.handle.as_deref_mut() else {
            error!("port record initialize(): no port handle provided");
            return false;
        };

        if handle.is_virtual_port() {
            let opened = if handle.is_input_port() {
                handle.init_in_sub()
            } else {
                handle.init_out_sub()
            };
            let ok = match opened {
                Ok(()) => true,
                Err(e) => {
                    warn!("virtual port {} open failed: {}", handle.display_name(), e);
                    false
                }
            };
            self.activate();
            ok
        } else if handle.is_input_port() {
            self.activate();
            true
        } else {
            match handle.init_out() {
                Ok(()) => {
                    debug!("opened output port {}", handle.display_name());
                    self.activate();
                    true
                }
                Err(e) => {
                    warn!("output port {} not opened: {}", handle.display_name(), e);
                    self.initialized = true;
                    false
                }
            }
        }
    }

    pub fn start(&mut self) {
        if let Some(handle) = self.handle.as_deref_mut() {
            handle.start();
        }
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.as_deref_mut() {
            handle.stop();
        }
    }

    pub fn continue_from(&mut self, tick: Pulse) {
        if let Some(handle) = self.handle.as_deref_mut() {
            handle.continue_from(tick);
        }
    }

    pub fn init_clock(&mut self, tick: Pulse) {
        if let Some(handle) = self.handle.as_deref_mut() {
            handle.init_clock(tick);
        }
    }

    pub fn clock(&mut self, tick: Pulse) {
        if let Some(handle) = self.handle.as_deref_mut() {
            handle.clock(tick);
        }
    }

    pub fn sysex(&mut self, event: &MidiEvent) {
        if let Some(handle) = self.handle.as_deref_mut() {
            if let Err(e) = handle.sysex(event) {
                warn!("sysex to {} failed: {}", handle.display_name(), e);
            }
        }
    }
}

impl Drop for PortRecord {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.as_deref_mut() {
            debug!("closing port {}", handle.display_name());
            handle.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::mock_port::MockPort;

    #[test]
    fn test_default_record_cannot_initialize_or_activate() {
        let mut record = PortRecord::default();
        assert!(!record.initialize());
        assert!(!record.active());
        assert!(!record.initialized());

        record.activate();
        assert!(!record.active());
        assert!(!record.initialized());
    }

    #[test]
    fn test_virtual_ports_always_activate() {
        for port in [
            MockPort::input(128, 0, "virt-in").virtual_port(),
            MockPort::output(128, 1, "virt-out").virtual_port(),
            MockPort::input(128, 2, "virt-in-bad")
                .virtual_port()
                .failing_open(),
            MockPort::output(128, 3, "virt-out-bad")
                .virtual_port()
                .failing_open(),
        ] {
            let log = port.log();
            let mut record = PortRecord::new(Box::new(port));
            record.initialize();
            assert!(record.active());
            assert!(record.initialized());
            assert_eq!(log.snapshot().open_calls, 1);
        }
    }

    #[test]
    fn test_virtual_open_failure_reported_but_active() {
        let port = MockPort::output(128, 0, "virt").virtual_port().failing_open();
        let mut record = PortRecord::new(Box::new(port));
        assert!(!record.initialize());
        assert!(record.active());
    }

    #[test]
    fn test_hardware_input_activates_without_open() {
        let port = MockPort::input(20, 0, "keys").failing_open();
        let log = port.log();
        let mut record = PortRecord::new(Box::new(port));
        assert!(record.initialize());
        assert!(record.active());
        assert!(record.initialized());
        assert_eq!(log.snapshot().open_calls, 0);
    }

    #[test]
    fn test_hardware_output_open_failure_is_settled_but_inactive() {
        let port = MockPort::output(20, 0, "synth").failing_open();
        let mut record = PortRecord::new(Box::new(port));
        assert!(!record.initialize());
        assert!(!record.active());
        assert!(record.initialized());
    }

    #[test]
    fn test_hardware_output_open_success() {
        let port = MockPort::output(20, 0, "synth");
        let mut record = PortRecord::new(Box::new(port));
        assert!(record.initialize());
        assert!(record.active());
        assert!(record.initialized());
    }

    #[test]
    fn test_deactivate_keeps_initialized() {
        let mut record = PortRecord::new(Box::new(MockPort::output(20, 0, "synth")));
        record.initialize();
        record.deactivate();
        assert!(!record.active());
        assert!(record.initialized());
    }

    #[test]
    fn test_drop_closes_handle() {
        let port = MockPort::output(20, 0, "synth");
        let log = port.log();
        drop(PortRecord::new(Box::new(port)));
        assert!(log.snapshot().closed);
    }
}
