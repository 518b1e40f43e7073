//! MIDI clock generation for output ports
//!
//! Sequencer time runs at `ppqn` pulses per quarter note while MIDI timing
//! clock runs at 24 pulses per quarter note. [`ClockState`] tracks the last
//! tick an output port has been clocked up to and works out which clock,
//! transport and song-position messages a port must emit as the sequencer
//! advances. Backends feed the returned messages to their transport.

use crate::midi::event::{MidiMessage, Pulse};
use crate::midi::port::ClockMode;
use log::trace;

/// Default sequencer resolution, pulses per quarter note
pub const DEFAULT_PPQN: u32 = 192;

/// MIDI standard timing clock resolution
pub const CLOCKS_PER_QUARTER: i64 = 24;

/// Default modulo, in sixteenth notes, that `Mod` clocking aligns to
pub const DEFAULT_CLOCK_MOD: i64 = 64;

#[derive(Debug, Clone)]
pub struct ClockState {
    mode: ClockMode,
    ppqn: i64,
    clock_mod: i64,
    last_tick: Pulse,
}

impl Default for ClockState {
    fn default() -> Self {
        Self::new(DEFAULT_PPQN, DEFAULT_CLOCK_MOD)
    }
}

impl ClockState {
    pub fn new(ppqn: u32, clock_mod: i64) -> Self {
        Self {
            mode: ClockMode::Off,
            ppqn: i64::from(ppqn),
            clock_mod: clock_mod.max(1),
            last_tick: -1,
        }
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ClockMode) {
        self.mode = mode;
    }

    pub fn last_tick(&self) -> Pulse {
        self.last_tick
    }

    fn sixteenth_ticks(&self) -> i64 {
        (self.ppqn / 4).max(1)
    }

    fn clock_ticks(&self) -> i64 {
        (self.ppqn / CLOCKS_PER_QUARTER).max(1)
    }

    pub fn start(&mut self) -> Vec<MidiMessage> {
        self.last_tick = -1;
        if self.mode.is_clocking() {
            vec![MidiMessage::Start]
        } else {
            Vec::new()
        }
    }

    pub fn stop(&mut self) -> Vec<MidiMessage> {
        self.last_tick = -1;
        if self.mode.is_clocking() {
            vec![MidiMessage::Stop]
        } else {
            Vec::new()
        }
    }

    /// Positions the follower at the sixteenth note containing `tick`.
    pub fn continue_from(&mut self, tick: Pulse) -> Vec<MidiMessage> {
        let sixteenth = self.sixteenth_ticks();
        let beats = tick.max(0) / sixteenth;
        let starting_tick = tick - tick % sixteenth;
        self.last_tick = starting_tick - 1;
        if !self.mode.is_clocking() {
            return Vec::new();
        }

        // The song position pointer is a 14-bit value
        let beats = beats.min(0x3FFF) as u16;
        vec![MidiMessage::SongPosition(beats), MidiMessage::Continue]
    }

    pub fn init_clock(&mut self, tick: Pulse) -> Vec<MidiMessage> {
        if self.mode == ClockMode::Pos && tick != 0 {
            return self.continue_from(tick);
        }
        if self.mode != ClockMode::Mod && tick != 0 {
            return Vec::new();
        }

        let messages = self.start();
        let clock_mod_ticks = self.sixteenth_ticks() * self.clock_mod;
        let leftover = tick % clock_mod_ticks;
        let mut starting_tick = tick - leftover;
        if leftover > 0 {
            starting_tick += clock_mod_ticks;
        }
        self.last_tick = starting_tick - 1;
        messages
    }

    /// Emits one timing clock for every clock boundary in `(last, tick]`.
    pub fn clock(&mut self, tick: Pulse) -> Vec<MidiMessage> {
        if !self.mode.is_clocking() {
            return Vec::new();
        }

        let clock_ticks = self.clock_ticks();
        let mut messages = Vec::new();
        while self.last_tick < tick {
            self.last_tick += 1;
            if self.last_tick % clock_ticks == 0 {
                messages.push(MidiMessage::Clock);
            }
        }
        trace!("clocked to tick {}: {} clocks", tick, messages.len());
        messages
    }
}
