//! Ordered collection of MIDI ports addressed by bus number
//!
//! A [`PortRegistry`] holds every port of one direction. Callers address a
//! port by its bus number, its position in the registry. Positions are
//! assigned in `add` order and only change when [`PortRegistry::replacement_port`]
//! removes a slot, which shifts every later port down by one. Callers that
//! keep bus numbers across hot-plug events should hold the [`BusId`] returned
//! by `add_*` and [`PortRegistry::resolve`] it again.
//!
//! Locking: the slot vector sits behind a [`ShardedLock`], taken for writing
//! only when slots are added or removed. Each record has its own mutex, so
//! the per-cycle calls (`play`, `clock`) only contend with a settings change
//! or hot-plug notification aimed at the same port.

use crate::midi::event::{MidiEvent, MidiMessage, Pulse};
use crate::midi::port::{ClockMode, MidiError, PortHandle, Result};
use crate::midi::record::PortRecord;
use crossbeam::sync::{ShardedLock, ShardedLockReadGuard, ShardedLockWriteGuard};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Longest display name [`PortRegistry::get_midi_bus_name`] will format
pub const MAX_BUS_NAME_LEN: usize = 79;

/// Stable key for a registry slot. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusId(u64);

struct Slot {
    id: BusId,
    record: Mutex<PortRecord>,
}

pub struct PortRegistry {
    slots: ShardedLock<Vec<Slot>>,
    next_id: AtomicU64,
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_record(record: &Mutex<PortRecord>) -> MutexGuard<'_, PortRecord> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}

fn truncate_name(mut name: String) -> String {
    if name.len() > MAX_BUS_NAME_LEN {
        let mut end = MAX_BUS_NAME_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

impl PortRegistry {
    pub fn new() -> Self {
        Self {
            slots: ShardedLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn read_slots(&self) -> ShardedLockReadGuard<'_, Vec<Slot>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slots(&self) -> ShardedLockWriteGuard<'_, Vec<Slot>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_record<T>(&self, bus: usize, f: impl FnOnce(&mut PortRecord) -> T) -> Option<T> {
        let slots = self.read_slots();
        let slot = slots.get(bus)?;
        let mut record = lock_record(&slot.record);
        Some(f(&mut record))
    }

    /// Runs `f` on the handle of `bus` if the bus exists and is active.
    fn with_active<T>(&self, bus: usize, f: impl FnOnce(&mut dyn PortHandle) -> T) -> Option<T> {
        self.with_record(bus, |record| {
            if !record.active() {
                return None;
            }
            record.handle_mut().map(|handle| f(handle))
        })
        .flatten()
    }

    fn for_each(&self, mut f: impl FnMut(&mut PortRecord)) {
        let slots = self.read_slots();
        for slot in slots.iter() {
            f(&mut lock_record(&slot.record));
        }
    }

    fn push(&self, record: PortRecord) -> Result<BusId> {
        let mut slots = self.write_slots();
        let count = slots.len();
        let id = BusId(self.next_id.fetch_add(1, Ordering::Relaxed));
        slots.push(Slot {
            id,
            record: Mutex::new(record),
        });
        if slots.len() == count + 1 {
            Ok(id)
        } else {
            Err(MidiError::RegistryError(format!(
                "expected {} ports after add, found {}",
                count + 1,
                slots.len()
            )))
        }
    }

    /// Adds an output port with the clock mode it should run with once
    /// [`set_all_clocks`](Self::set_all_clocks) is called.
    pub fn add_output(&self, handle: Box<dyn PortHandle>, clock: ClockMode) -> Result<BusId> {
        debug!("adding output port {} (clock {})", handle.display_name(), clock);
        let mut record = PortRecord::new(handle);
        record.set_configured_clock(clock);
        self.push(record)
    }

    /// Adds an input port. When `inputting` is requested and the port is not
    /// already receiving, input is enabled right away.
    pub fn add_input(&self, mut handle: Box<dyn PortHandle>, inputting: bool) -> Result<BusId> {
        debug!(
            "adding input port {} (input {})",
            handle.display_name(),
            inputting
        );
        if inputting && !handle.input_enabled() {
            if let Err(e) = handle.set_input(true) {
                warn!("could not enable input on {}: {}", handle.display_name(), e);
            }
        }
        let mut record = PortRecord::new(handle);
        record.set_configured_input(inputting);
        self.push(record)
    }

    pub fn len(&self) -> usize {
        self.read_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current bus number of a slot, or `None` once it has been replaced.
    pub fn resolve(&self, id: BusId) -> Option<usize> {
        self.read_slots().iter().position(|slot| slot.id == id)
    }

    pub fn bus_id(&self, bus: usize) -> Option<BusId> {
        self.read_slots().get(bus).map(|slot| slot.id)
    }

    /// Initializes every port in order.
    ///
    /// Returns true only if every port came up cleanly. A false result is
    /// advisory: ports that did activate are usable.
    pub fn initialize(&self) -> bool {
        let mut all_ok = true;
        self.for_each(|record| {
            if !record.initialize() {
                all_ok = false;
            }
        });
        info!(
            "initialized {} ports{}",
            self.len(),
            if all_ok { "" } else { " (some unavailable)" }
        );
        all_ok
    }

    /// Initializes a single port, e.g. one added after startup.
    pub fn initialize_bus(&self, bus: usize) -> bool {
        self.with_record(bus, PortRecord::initialize)
            .unwrap_or(false)
    }

    pub fn is_active(&self, bus: usize) -> bool {
        self.with_record(bus, |record| record.active())
            .unwrap_or(false)
    }

    pub fn is_initialized(&self, bus: usize) -> bool {
        self.with_record(bus, |record| record.initialized())
            .unwrap_or(false)
    }

    pub fn configured_clock(&self, bus: usize) -> Option<ClockMode> {
        self.with_record(bus, |record| record.configured_clock())
    }

    pub fn configured_input(&self, bus: usize) -> Option<bool> {
        self.with_record(bus, |record| record.configured_input())
    }

    // Transport broadcasts. Meant for output registries; no direction check.

    pub fn start(&self) {
        self.for_each(PortRecord::start);
    }

    pub fn stop(&self) {
        self.for_each(PortRecord::stop);
    }

    pub fn continue_from(&self, tick: Pulse) {
        self.for_each(|record| record.continue_from(tick));
    }

    pub fn init_clock(&self, tick: Pulse) {
        self.for_each(|record| record.init_clock(tick));
    }

    pub fn clock(&self, tick: Pulse) {
        self.for_each(|record| record.clock(tick));
    }

    pub fn sysex(&self, event: &MidiEvent) {
        self.for_each(|record| record.sysex(event));
    }

    /// Sends one event to one port. Unknown or inactive buses are ignored.
    pub fn play(&self, bus: usize, event: &MidiEvent, channel: u8) {
        self.with_active(bus, |handle| {
            if let Err(e) = handle.play(event, channel) {
                warn!("play on {} failed: {}", handle.display_name(), e);
            }
        });
    }

    /// Sets and applies the clock mode of an active bus.
    ///
    /// Returns false if the bus does not exist or is inactive.
    pub fn set_clock(&self, bus: usize, mode: ClockMode) -> bool {
        self.with_record(bus, |record| {
            if !record.active() {
                return false;
            }
            record.set_configured_clock(mode);
            if let Some(handle) = record.handle_mut() {
                handle.set_clock(mode);
            }
            true
        })
        .unwrap_or(false)
    }

    /// Live clock mode of an active bus, `Off` otherwise.
    pub fn get_clock(&self, bus: usize) -> ClockMode {
        self.with_active(bus, |handle| handle.clock_mode())
            .unwrap_or(ClockMode::Off)
    }

    /// Pushes every port's configured clock mode to its backend, active or
    /// not.
    pub fn set_all_clocks(&self) {
        self.for_each(|record| {
            let mode = record.configured_clock();
            if let Some(handle) = record.handle_mut() {
                handle.set_clock(mode);
            }
        });
    }

    /// Records the wanted input state of a bus, and applies it if the bus is
    /// active. The wanted state is kept even when the backend refuses it.
    ///
    /// Returns false if the bus does not exist or the backend call failed.
    pub fn set_input(&self, bus: usize, inputting: bool) -> bool {
        self.with_record(bus, |record| {
            let mut ok = true;
            if record.active() {
                if let Some(handle) = record.handle_mut() {
                    if let Err(e) = handle.set_input(inputting) {
                        warn!(
                            "set_input({}) on {} failed: {}",
                            inputting,
                            handle.display_name(),
                            e
                        );
                        ok = false;
                    }
                }
            }
            record.set_configured_input(inputting);
            ok
        })
        .unwrap_or(false)
    }

    /// Whether an active bus is receiving. System ports always are.
    pub fn get_input(&self, bus: usize) -> bool {
        self.with_active(bus, |handle| handle.is_system_port() || handle.input_enabled())
            .unwrap_or(false)
    }

    pub fn is_system_port(&self, bus: usize) -> bool {
        self.with_active(bus, |handle| handle.is_system_port())
            .unwrap_or(false)
    }

    /// Pushes every port's configured input state to its backend, active or
    /// not.
    pub fn set_all_inputs(&self) {
        self.for_each(|record| {
            let inputting = record.configured_input();
            if let Some(handle) = record.handle_mut() {
                if let Err(e) = handle.set_input(inputting) {
                    warn!("set_input({}) on {} failed: {}", inputting, handle.display_name(), e);
                }
            }
        });
    }

    /// Deactivates every port matching `client:port`, returning how many
    /// matched.
    pub fn port_exit(&self, client: i32, port: i32) -> usize {
        let mut matched = 0;
        self.for_each(|record| {
            let is_match = record
                .handle()
                .is_some_and(|handle| handle.matches(client, port));
            if is_match {
                record.deactivate();
                matched += 1;
            }
        });
        if matched > 0 {
            info!("port {}:{} exited, {} bus(es) deactivated", client, port, matched);
        }
        matched
    }

    /// Removes the first inactive port matching `client:port` and returns
    /// the bus number it occupied. Later buses shift down by one.
    ///
    /// Active ports are never removed. Returns `None` if nothing matched.
    pub fn replacement_port(&self, client: i32, port: i32) -> Option<usize> {
        let mut slots = self.write_slots();
        let index = slots.iter_mut().position(|slot| {
            let record = slot.record.get_mut().unwrap_or_else(PoisonError::into_inner);
            !record.active()
                && record
                    .handle()
                    .is_some_and(|handle| handle.matches(client, port))
        })?;
        let removed = slots.remove(index);
        drop(slots);
        drop(removed);
        info!("replacing port {}:{} at bus {}", client, port, index);
        Some(index)
    }

    /// Non-blocking check: true as soon as one port has input pending.
    pub fn poll_for_midi(&self) -> bool {
        let slots = self.read_slots();
        slots.iter().any(|slot| {
            lock_record(&slot.record)
                .handle_mut()
                .is_some_and(|handle| handle.poll_for_midi())
        })
    }

    /// First pending input message, scanning buses in order.
    pub fn get_midi_event(&self) -> Option<(usize, MidiMessage)> {
        let slots = self.read_slots();
        slots.iter().enumerate().find_map(|(bus, slot)| {
            lock_record(&slot.record)
                .handle_mut()
                .and_then(|handle| handle.get_midi_event())
                .map(|message| (bus, message))
        })
    }

    /// Display name of a bus for port lists; empty for an unknown bus.
    ///
    /// Names formatted here are cut to [`MAX_BUS_NAME_LEN`]; an active port's
    /// own display name is passed through as is.
    pub fn get_midi_bus_name(&self, bus: usize) -> String {
        self.with_record(bus, |record| {
            let Some(handle) = record.handle() else {
                return String::new();
            };
            if record.active() {
                if handle.port_name().starts_with(handle.bus_name()) {
                    truncate_name(format!(
                        "[{}] {}:{} {}",
                        bus,
                        handle.bus_id(),
                        handle.port_id(),
                        handle.port_name()
                    ))
                } else {
                    handle.display_name()
                }
            } else {
                let status = if record.initialized() {
                    "disconnected"
                } else {
                    "virtual"
                };
                truncate_name(format!("{} ({})", handle.display_name(), status))
            }
        })
        .unwrap_or_default()
    }

    /// `busName:portName` for every port, in bus order.
    pub fn bus_listing(&self) -> Vec<String> {
        let mut listing = Vec::with_capacity(self.len());
        self.for_each(|record| {
            if let Some(handle) = record.handle() {
                listing.push(format!("{}:{}", handle.bus_name(), handle.port_name()));
            }
        });
        listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_name_respects_char_boundaries() {
        let long = "é".repeat(60);
        let truncated = truncate_name(long);
        assert!(truncated.len() <= MAX_BUS_NAME_LEN);
        assert_eq!(truncated.chars().count(), 39);
    }

    #[test]
    fn test_short_names_untouched() {
        assert_eq!(truncate_name("abc".to_string()), "abc");
    }
}
