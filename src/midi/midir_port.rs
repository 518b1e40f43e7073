//! MIDI ports backed by midir
//!
//! Hardware outputs are opened by [`PortHandle::init_out`], hardware inputs
//! by enabling input. Virtual ports use midir's unix virtual-port support.
//! Incoming bytes are pushed by midir's callback thread into a channel that
//! the registry polls without blocking.

use crate::hotplug::PortScanner;
use crate::midi::clock::{ClockState, DEFAULT_CLOCK_MOD, DEFAULT_PPQN};
use crate::midi::event::{MidiEvent, MidiMessage, Pulse};
use crate::midi::port::{
    ClockMode, MidiError, PortDirection, PortHandle, PortIdentity, PortKind, Result,
};
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use midir::{
    Ignore, MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection,
    MidiOutputPort,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Client id used when the backend does not report one
pub const CLIENT_UNKNOWN: i32 = -1;

/// Port ids for backends whose names carry no `client:port` suffix.
///
/// A name keeps the id it was first given for the life of the table, so
/// unplugging one device never renumbers the others. Repeated names (two
/// identical devices) are told apart by their order within one scan.
#[derive(Debug, Default)]
pub struct PortIdTable {
    ids: HashMap<(PortDirection, String, usize), i32>,
    next_id: i32,
}

impl PortIdTable {
    pub fn id_for(&mut self, direction: PortDirection, name: &str, occurrence: usize) -> i32 {
        let next_id = &mut self.next_id;
        *self
            .ids
            .entry((direction, name.to_string(), occurrence))
            .or_insert_with(|| {
                let id = *next_id;
                *next_id += 1;
                id
            })
    }
}

/// Backend-wide options shared by every port this application opens.
///
/// Clones share one [`PortIdTable`], so discovery, the hot-plug scanner and
/// port reopening all agree on the ids of suffix-less ports.
#[derive(Debug, Clone)]
pub struct PortOptions {
    pub client_name: String,
    pub ppqn: u32,
    pub clock_mod: i64,
    pub port_ids: Arc<Mutex<PortIdTable>>,
}

impl Default for PortOptions {
    fn default() -> Self {
        Self {
            client_name: "midibusrs".to_string(),
            ppqn: DEFAULT_PPQN,
            clock_mod: DEFAULT_CLOCK_MOD,
            port_ids: Arc::default(),
        }
    }
}

/// Bus name, port name, client id and port id of one port.
pub type PortName = (String, String, i32, i32);

/// Splits an ALSA-style name, `"Client Name:Port Name 20:0"`.
fn split_alsa_name(full: &str) -> Option<PortName> {
    let (names, ids) = full.rsplit_once(' ')?;
    let (client, port) = ids.split_once(':')?;
    let client = client.parse::<i32>().ok()?;
    let port = port.parse::<i32>().ok()?;
    Some(match names.split_once(':') {
        Some((bus, port_name)) => (bus.to_string(), port_name.to_string(), client, port),
        None => (names.to_string(), names.to_string(), client, port),
    })
}

/// Splits a midir port name into bus name, port name, client and port ids.
///
/// Names without the trailing ids (other backends) keep the whole name and
/// use `fallback_port` as the port id.
pub fn parse_port_name(full: &str, fallback_port: i32) -> PortName {
    split_alsa_name(full).unwrap_or_else(|| {
        (
            full.to_string(),
            full.to_string(),
            CLIENT_UNKNOWN,
            fallback_port,
        )
    })
}

/// Names every port of one scan. Suffix-less names take their port id from
/// the shared [`PortIdTable`].
pub fn name_ports(
    options: &PortOptions,
    direction: PortDirection,
    names: &[&str],
) -> Vec<PortName> {
    let mut table = options
        .port_ids
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let mut seen: HashMap<&str, usize> = HashMap::new();
    names
        .iter()
        .map(|&name| {
            let occurrence = seen.entry(name).or_insert(0);
            let nth = *occurrence;
            *occurrence += 1;
            split_alsa_name(name).unwrap_or_else(|| {
                let port = table.id_for(direction, name, nth);
                (name.to_string(), name.to_string(), CLIENT_UNKNOWN, port)
            })
        })
        .collect()
}

enum Endpoint {
    Input(MidiInputPort),
    Output(MidiOutputPort),
    Virtual,
}

pub struct MidirPort {
    client_name: String,
    direction: PortDirection,
    endpoint: Endpoint,
    bus_name: String,
    port_name: String,
    client: i32,
    port: i32,
    output: Option<MidiOutputConnection>,
    input: Option<MidiInputConnection<()>>,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    inputting: bool,
    clock: ClockState,
}

impl MidirPort {
    fn new(
        options: &PortOptions,
        direction: PortDirection,
        endpoint: Endpoint,
        name: PortName,
    ) -> Self {
        let (bus_name, port_name, client, port) = name;
        let (tx, rx) = unbounded();
        Self {
            client_name: options.client_name.clone(),
            direction,
            endpoint,
            bus_name,
            port_name,
            client,
            port,
            output: None,
            input: None,
            tx,
            rx,
            inputting: false,
            clock: ClockState::new(options.ppqn, options.clock_mod),
        }
    }

    pub fn hardware_output(options: &PortOptions, port: MidiOutputPort, name: PortName) -> Self {
        Self::new(options, PortDirection::Output, Endpoint::Output(port), name)
    }

    pub fn hardware_input(options: &PortOptions, port: MidiInputPort, name: PortName) -> Self {
        Self::new(options, PortDirection::Input, Endpoint::Input(port), name)
    }

    /// A software port owned by this application, numbered `index`.
    pub fn virtual_port(options: &PortOptions, direction: PortDirection, index: usize) -> Self {
        let full_name = format!("{} port {}", options.client_name, index);
        let name = parse_port_name(&full_name, index as i32);
        let mut port = Self::new(options, direction, Endpoint::Virtual, name);
        port.bus_name = options.client_name.clone();
        port
    }

    pub fn kind(&self) -> PortKind {
        match self.endpoint {
            Endpoint::Virtual => PortKind::Virtual,
            _ => PortKind::Normal,
        }
    }

    fn connection_name(&self) -> String {
        format!("{}-{}", self.client_name, self.port_name)
    }

    fn input_callback(&self) -> impl FnMut(u64, &[u8], &mut ()) + Send + 'static {
        let tx = self.tx.clone();
        move |_stamp: u64, message: &[u8], _: &mut ()| {
            let _ = tx.send(message.to_vec());
        }
    }

    fn open_input(&mut self) -> Result<()> {
        let Endpoint::Input(endpoint) = &self.endpoint else {
            return Err(MidiError::InitError(format!(
                "{} has no hardware input endpoint",
                self.port_name
            )));
        };
        let mut midi_in = MidiInput::new(&self.client_name)?;
        midi_in.ignore(Ignore::None);
        let connection = midi_in.connect(
            endpoint,
            &self.connection_name(),
            self.input_callback(),
            (),
        )?;
        info!("input enabled on {}", self.display_name());
        self.input = Some(connection);
        Ok(())
    }

    fn close_input(&mut self) {
        if let Some(connection) = self.input.take() {
            connection.close();
            info!("input disabled on {}", self.display_name());
        }
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| MidiError::SendError("output port not open".to_string()))?;
        output.send(bytes)?;
        Ok(())
    }

    /// Drops bytes a still-open connection delivered while input is off.
    fn discard_input(&self) {
        let dropped = self.rx.try_iter().count();
        if dropped > 0 {
            debug!("discarded {} messages on {} (input off)", dropped, self.display_name());
        }
    }

    /// Sends clock-state output; ports that never opened stay silent.
    fn send_transport(&mut self, messages: Vec<MidiMessage>) {
        if self.output.is_none() {
            return;
        }
        for message in messages {
            if let Err(e) = self.send_bytes(&message.to_bytes()) {
                warn!("{:?} to {} failed: {}", message, self.display_name(), e);
            }
        }
    }
}

#[cfg(unix)]
impl MidirPort {
    fn create_virtual_output(&mut self) -> Result<()> {
        use midir::os::unix::VirtualOutput;
        let midi_out = MidiOutput::new(&self.client_name)?;
        self.output = Some(midi_out.create_virtual(&self.port_name)?);
        Ok(())
    }

    fn create_virtual_input(&mut self) -> Result<()> {
        use midir::os::unix::VirtualInput;
        let mut midi_in = MidiInput::new(&self.client_name)?;
        midi_in.ignore(Ignore::None);
        let callback = self.input_callback();
        self.input = Some(midi_in.create_virtual(&self.port_name, callback, ())?);
        Ok(())
    }
}

#[cfg(not(unix))]
impl MidirPort {
    fn create_virtual_output(&mut self) -> Result<()> {
        Err(MidiError::InitError(
            "virtual ports are not supported on this platform".to_string(),
        ))
    }

    fn create_virtual_input(&mut self) -> Result<()> {
        self.create_virtual_output()
    }
}

impl PortHandle for MidirPort {
    fn is_input_port(&self) -> bool {
        self.direction == PortDirection::Input
    }

    fn is_virtual_port(&self) -> bool {
        self.kind() == PortKind::Virtual
    }

    fn is_system_port(&self) -> bool {
        self.client == 0
    }

    fn init_in_sub(&mut self) -> Result<()> {
        self.create_virtual_input()?;
        self.inputting = true;
        Ok(())
    }

    fn init_out_sub(&mut self) -> Result<()> {
        self.create_virtual_output()
    }

    fn init_out(&mut self) -> Result<()> {
        let Endpoint::Output(endpoint) = &self.endpoint else {
            return Err(MidiError::InitError(format!(
                "{} has no hardware output endpoint",
                self.port_name
            )));
        };
        let midi_out = MidiOutput::new(&self.client_name)?;
        let connection = midi_out.connect(endpoint, &self.connection_name())?;
        self.output = Some(connection);
        Ok(())
    }

    fn set_clock(&mut self, mode: ClockMode) {
        debug!("clock {} on {}", mode, self.display_name());
        self.clock.set_mode(mode);
    }

    fn clock_mode(&self) -> ClockMode {
        self.clock.mode()
    }

    fn set_input(&mut self, inputting: bool) -> Result<()> {
        if self.is_virtual_port() {
            self.inputting = inputting;
            return Ok(());
        }
        if inputting && self.input.is_none() {
            self.open_input()?;
        } else if !inputting {
            self.close_input();
        }
        self.inputting = inputting;
        Ok(())
    }

    fn input_enabled(&self) -> bool {
        self.inputting
    }

    fn poll_for_midi(&mut self) -> bool {
        if !self.inputting {
            self.discard_input();
            return false;
        }
        !self.rx.is_empty()
    }

    fn get_midi_event(&mut self) -> Option<MidiMessage> {
        if !self.inputting {
            self.discard_input();
            return None;
        }
        while let Ok(bytes) = self.rx.try_recv() {
            if let Some(message) = MidiMessage::from_bytes(&bytes) {
                return Some(message);
            }
            debug!("dropping unparsed input {:02X?}", bytes);
        }
        None
    }

    fn bus_name(&self) -> &str {
        &self.bus_name
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn display_name(&self) -> String {
        format!(
            "{}:{} {}:{}",
            self.client, self.port, self.bus_name, self.port_name
        )
    }

    fn bus_id(&self) -> i32 {
        self.client
    }

    fn port_id(&self) -> i32 {
        self.port
    }

    fn play(&mut self, event: &MidiEvent, channel: u8) -> Result<()> {
        self.send_bytes(&event.message.to_bytes_on(channel))
    }

    fn sysex(&mut self, event: &MidiEvent) -> Result<()> {
        if self.output.is_none() {
            return Ok(());
        }
        self.send_bytes(&event.message.to_bytes())
    }

    fn start(&mut self) {
        let messages = self.clock.start();
        self.send_transport(messages);
    }

    fn stop(&mut self) {
        let messages = self.clock.stop();
        self.send_transport(messages);
    }

    fn continue_from(&mut self, tick: Pulse) {
        let messages = self.clock.continue_from(tick);
        self.send_transport(messages);
    }

    fn init_clock(&mut self, tick: Pulse) {
        let messages = self.clock.init_clock(tick);
        self.send_transport(messages);
    }

    fn clock(&mut self, tick: Pulse) {
        let messages = self.clock.clock(tick);
        self.send_transport(messages);
    }

    fn close(&mut self) {
        if let Some(connection) = self.output.take() {
            connection.close();
        }
        self.close_input();
        debug!("closed {}", self.display_name());
    }
}

fn is_own_port(options: &PortOptions, full_name: &str) -> bool {
    full_name.starts_with(&format!("{}:", options.client_name))
}

/// Keeps the ports not created by this application, warning about any
/// whose name cannot be read.
fn foreign_ports<P>(
    options: &PortOptions,
    ports: Vec<P>,
    port_name: impl Fn(&P) -> std::result::Result<String, midir::PortInfoError>,
) -> Vec<(P, String)> {
    ports
        .into_iter()
        .enumerate()
        .filter_map(|(index, port)| match port_name(&port) {
            Ok(name) if !is_own_port(options, &name) => Some((port, name)),
            Ok(_) => None,
            Err(e) => {
                warn!("skipping port {}: {}", index, e);
                None
            }
        })
        .collect()
}

fn named<P>(
    options: &PortOptions,
    direction: PortDirection,
    ports: Vec<(P, String)>,
) -> Vec<(P, PortName)> {
    let names: Vec<&str> = ports.iter().map(|(_, name)| name.as_str()).collect();
    let parsed = name_ports(options, direction, &names);
    ports
        .into_iter()
        .map(|(port, _)| port)
        .zip(parsed)
        .collect()
}

/// Hardware output ports currently known to the system, skipping our own.
pub fn discover_outputs(options: &PortOptions) -> Result<Vec<MidirPort>> {
    let midi_out = MidiOutput::new(&format!("{}-scan", options.client_name))?;
    let ports = foreign_ports(options, midi_out.ports(), |port| midi_out.port_name(port));
    Ok(named(options, PortDirection::Output, ports)
        .into_iter()
        .map(|(port, name)| MidirPort::hardware_output(options, port, name))
        .collect())
}

/// Hardware input ports currently known to the system, skipping our own.
pub fn discover_inputs(options: &PortOptions) -> Result<Vec<MidirPort>> {
    let midi_in = MidiInput::new(&format!("{}-scan", options.client_name))?;
    let ports = foreign_ports(options, midi_in.ports(), |port| midi_in.port_name(port));
    Ok(named(options, PortDirection::Input, ports)
        .into_iter()
        .map(|(port, name)| MidirPort::hardware_input(options, port, name))
        .collect())
}

/// Opens a fresh handle for a port announced by the hot-plug watcher.
pub fn open_port(options: &PortOptions, identity: &PortIdentity) -> Option<Box<dyn PortHandle>> {
    let ports = match identity.direction {
        PortDirection::Output => discover_outputs(options),
        PortDirection::Input => discover_inputs(options),
    };
    match ports {
        Ok(ports) => ports
            .into_iter()
            .find(|port| port.matches(identity.client, identity.port))
            .map(|port| Box::new(port) as Box<dyn PortHandle>),
        Err(e) => {
            warn!("could not rescan ports for {}: {}", identity, e);
            None
        }
    }
}

/// Names of every port, both directions, for `--port-list`.
pub fn list_ports() -> Vec<String> {
    let options = PortOptions::default();
    let mut names = Vec::new();
    match discover_inputs(&options) {
        Ok(ports) => names.extend(ports.iter().map(|p| format!("{} [Input]", p.display_name()))),
        Err(e) => warn!("could not list input ports: {}", e),
    }
    match discover_outputs(&options) {
        Ok(ports) => names.extend(ports.iter().map(|p| format!("{} [Output]", p.display_name()))),
        Err(e) => warn!("could not list output ports: {}", e),
    }
    names
}

/// Scans midir for the hot-plug watcher.
pub struct MidirScanner {
    options: PortOptions,
}

impl MidirScanner {
    pub fn new(options: PortOptions) -> Self {
        Self { options }
    }
}

impl PortScanner for MidirScanner {
    fn scan(&mut self) -> Vec<PortIdentity> {
        let mut identities = Vec::new();
        if let Ok(ports) = discover_outputs(&self.options) {
            identities.extend(ports.iter().map(|p| p.identity()));
        }
        if let Ok(ports) = discover_inputs(&self.options) {
            identities.extend(ports.iter().map(|p| p.identity()));
        }
        identities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotplug::{diff_ports, PortEvent};
    use std::collections::BTreeSet;

    #[test]
    fn test_parse_alsa_port_name() {
        let (bus, port, client, port_id) =
            parse_port_name("Midi Through:Midi Through Port-0 14:0", 3);
        assert_eq!(bus, "Midi Through");
        assert_eq!(port, "Midi Through Port-0");
        assert_eq!(client, 14);
        assert_eq!(port_id, 0);
    }

    #[test]
    fn test_parse_plain_port_name_falls_back_to_index() {
        let (bus, port, client, port_id) = parse_port_name("IAC Driver Bus 1", 2);
        assert_eq!(bus, "IAC Driver Bus 1");
        assert_eq!(port, "IAC Driver Bus 1");
        assert_eq!(client, CLIENT_UNKNOWN);
        assert_eq!(port_id, 2);
    }

    #[test]
    fn test_virtual_port_naming() {
        let options = PortOptions::default();
        let port = MidirPort::virtual_port(&options, PortDirection::Output, 3);
        assert!(port.is_virtual_port());
        assert!(!port.is_input_port());
        assert_eq!(port.bus_name(), "midibusrs");
        assert_eq!(port.port_name(), "midibusrs port 3");
        assert!(!port.is_system_port());
    }

    #[test]
    fn test_unopened_port_refuses_play() {
        let options = PortOptions::default();
        let mut port = MidirPort::virtual_port(&options, PortDirection::Output, 0);
        let event = MidiEvent::new(0, MidiMessage::Clock);
        assert!(port.play(&event, 0).is_err());
        // Transport on an unopened port is silently skipped
        port.start();
        port.clock(96);
    }

    fn output_ids(options: &PortOptions, names: &[&str]) -> BTreeSet<PortIdentity> {
        name_ports(options, PortDirection::Output, names)
            .into_iter()
            .map(|(_, _, client, port)| PortIdentity::new(client, port, PortDirection::Output))
            .collect()
    }

    #[test]
    fn test_suffixless_ids_survive_unplug() {
        let options = PortOptions::default();
        let before_names = ["IAC A", "USB Synth B", "USB Drums C"];
        let before = name_ports(&options, PortDirection::Output, &before_names);
        let synth = PortIdentity::new(before[1].2, before[1].3, PortDirection::Output);

        let previous = output_ids(&options, &before_names);
        let current = output_ids(&options, &["IAC A", "USB Drums C"]);
        assert_eq!(diff_ports(&previous, &current), vec![PortEvent::Exit(synth)]);

        // Coming back, the synth gets its old id
        let again = output_ids(&options, &["IAC A", "USB Synth B", "USB Drums C"]);
        assert_eq!(diff_ports(&current, &again), vec![PortEvent::Start(synth)]);
    }

    #[test]
    fn test_repeated_names_get_distinct_ids() {
        let options = PortOptions::default();
        let ids = output_ids(&options, &["USB MIDI", "USB MIDI"]);
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_alsa_names_ignore_id_table() {
        let options = PortOptions::default();
        let named = name_ports(&options, PortDirection::Input, &["Synth:Synth In 24:1"]);
        assert_eq!(named[0], ("Synth".to_string(), "Synth In".to_string(), 24, 1));
    }

    #[test]
    fn test_ids_are_shared_between_option_clones() {
        let options = PortOptions::default();
        let scanner_options = options.clone();
        let first = output_ids(&options, &["Pads", "Keys"]);
        let second = output_ids(&scanner_options, &["Keys"]);
        assert!(second.is_subset(&first));
    }

    #[test]
    fn test_input_off_discards_pending_bytes() {
        let options = PortOptions::default();
        let mut port = MidirPort::virtual_port(&options, PortDirection::Input, 0);
        port.inputting = true;
        port.tx.send(vec![0xF8]).unwrap();
        assert!(port.poll_for_midi());
        assert_eq!(port.get_midi_event(), Some(MidiMessage::Clock));

        port.set_input(false).unwrap();
        port.tx.send(vec![0xFA]).unwrap();
        assert!(!port.poll_for_midi());
        assert!(!port.input_enabled());

        port.set_input(true).unwrap();
        assert!(!port.poll_for_midi());
        assert_eq!(port.get_midi_event(), None);
    }
}
