//! In-memory port used by tests and the `test-mock` feature

use crate::midi::event::{MidiEvent, MidiMessage, Pulse};
use crate::midi::port::{ClockMode, MidiError, PortDirection, PortHandle, PortKind, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Start,
    Stop,
    ContinueFrom(Pulse),
    InitClock(Pulse),
    Clock(Pulse),
}

/// Everything a [`MockPort`] has been asked to do.
#[derive(Debug, Clone, Default)]
pub struct MockLog {
    pub played: Vec<(MidiEvent, u8)>,
    pub sysex: Vec<MidiEvent>,
    pub transport: Vec<TransportCall>,
    pub clock_sets: Vec<ClockMode>,
    pub input_sets: Vec<bool>,
    pub open_calls: usize,
    pub poll_calls: usize,
    pub closed: bool,
}

/// Shared view of a mock port's log, still readable after the port itself
/// has been moved into a registry.
#[derive(Debug, Clone, Default)]
pub struct MockLogHandle(Arc<Mutex<MockLog>>);

impl MockLogHandle {
    pub fn snapshot(&self) -> MockLog {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, f: impl FnOnce(&mut MockLog)) {
        f(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

pub struct MockPort {
    direction: PortDirection,
    kind: PortKind,
    system: bool,
    client: i32,
    port: i32,
    bus_name: String,
    port_name: String,
    open_ok: bool,
    clock: ClockMode,
    inputting: bool,
    pending: VecDeque<MidiMessage>,
    log: MockLogHandle,
}

impl MockPort {
    fn new(direction: PortDirection, client: i32, port: i32, name: &str) -> Self {
        Self {
            direction,
            kind: PortKind::Normal,
            system: false,
            client,
            port,
            bus_name: format!("client-{}", client),
            port_name: name.to_string(),
            open_ok: true,
            clock: ClockMode::Off,
            inputting: false,
            pending: VecDeque::new(),
            log: MockLogHandle::default(),
        }
    }

    pub fn input(client: i32, port: i32, name: &str) -> Self {
        Self::new(PortDirection::Input, client, port, name)
    }

    pub fn output(client: i32, port: i32, name: &str) -> Self {
        Self::new(PortDirection::Output, client, port, name)
    }

    pub fn virtual_port(mut self) -> Self {
        self.kind = PortKind::Virtual;
        self
    }

    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    /// Makes every open attempt, including enabling input, fail.
    pub fn failing_open(mut self) -> Self {
        self.open_ok = false;
        self
    }

    pub fn with_bus_name(mut self, bus_name: &str) -> Self {
        self.bus_name = bus_name.to_string();
        self
    }

    pub fn with_pending(mut self, message: MidiMessage) -> Self {
        self.pending.push_back(message);
        self
    }

    /// Live input state before the registry touches the port.
    pub fn with_input(mut self, inputting: bool) -> Self {
        self.inputting = inputting;
        self
    }

    pub fn log(&self) -> MockLogHandle {
        self.log.clone()
    }

    fn open(&self) -> Result<()> {
        self.log.record(|log| log.open_calls += 1);
        if self.open_ok {
            Ok(())
        } else {
            Err(MidiError::ConnectionError(format!(
                "mock port {} refused to open",
                self.port_name
            )))
        }
    }
}

impl PortHandle for MockPort {
    fn is_input_port(&self) -> bool {
        self.direction == PortDirection::Input
    }

    fn is_virtual_port(&self) -> bool {
        self.kind == PortKind::Virtual
    }

    fn is_system_port(&self) -> bool {
        self.system
    }

    fn init_in_sub(&mut self) -> Result<()> {
        self.open()
    }

    fn init_out_sub(&mut self) -> Result<()> {
        self.open()
    }

    fn init_out(&mut self) -> Result<()> {
        self.open()
    }

    fn set_clock(&mut self, mode: ClockMode) {
        self.clock = mode;
        self.log.record(|log| log.clock_sets.push(mode));
    }

    fn clock_mode(&self) -> ClockMode {
        self.clock
    }

    fn set_input(&mut self, inputting: bool) -> Result<()> {
        self.log.record(|log| log.input_sets.push(inputting));
        if inputting && !self.open_ok {
            return Err(MidiError::ConnectionError(format!(
                "mock port {} refused input",
                self.port_name
            )));
        }
        self.inputting = inputting;
        Ok(())
    }

    fn input_enabled(&self) -> bool {
        self.inputting
    }

    fn poll_for_midi(&mut self) -> bool {
        self.log.record(|log| log.poll_calls += 1);
        !self.pending.is_empty()
    }

    fn get_midi_event(&mut self) -> Option<MidiMessage> {
        self.pending.pop_front()
    }

    fn bus_name(&self) -> &str {
        &self.bus_name
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn display_name(&self) -> String {
        format!("{}:{}", self.bus_name, self.port_name)
    }

    fn bus_id(&self) -> i32 {
        self.client
    }

    fn port_id(&self) -> i32 {
        self.port
    }

    fn play(&mut self, event: &MidiEvent, channel: u8) -> Result<()> {
        self.log
            .record(|log| log.played.push((event.clone(), channel)));
        Ok(())
    }

    fn sysex(&mut self, event: &MidiEvent) -> Result<()> {
        self.log.record(|log| log.sysex.push(event.clone()));
        Ok(())
    }

    fn start(&mut self) {
        self.log.record(|log| log.transport.push(TransportCall::Start));
    }

    fn stop(&mut self) {
        self.log.record(|log| log.transport.push(TransportCall::Stop));
    }

    fn continue_from(&mut self, tick: Pulse) {
        self.log
            .record(|log| log.transport.push(TransportCall::ContinueFrom(tick)));
    }

    fn init_clock(&mut self, tick: Pulse) {
        self.log
            .record(|log| log.transport.push(TransportCall::InitClock(tick)));
    }

    fn clock(&mut self, tick: Pulse) {
        self.log
            .record(|log| log.transport.push(TransportCall::Clock(tick)));
    }

    fn close(&mut self) {
        self.log.record(|log| log.closed = true);
    }
}

/// Port names reported by the mock backend
pub fn list_devices() -> Vec<String> {
    vec!["Mock Device 1".to_string(), "Mock Device 2".to_string()]
}
