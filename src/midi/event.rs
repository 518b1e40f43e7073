//! Timed MIDI events passed through the registry to backend ports

/// Sequencer time in pulses (ticks)
pub type Pulse = i64;

/// Represents a MIDI message that can be sent or received
#[derive(Debug, Clone, PartialEq)]
pub enum MidiMessage {
    /// Note On message with note number and velocity
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note Off message with note number and velocity
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// Control Change message with controller number and value
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    /// Program Change message with program number
    ProgramChange { channel: u8, program: u8 },
    /// Pitch bend, 14-bit value centred on 0x2000
    PitchBend { channel: u8, value: u16 },
    /// MIDI Clock timing message
    Clock,
    /// MIDI Start message
    Start,
    /// MIDI Stop message
    Stop,
    /// MIDI Continue message
    Continue,
    /// Song Position Pointer, in sixteenth notes
    SongPosition(u16),
    /// Complete System Exclusive message, including the F0/F7 framing
    SysEx(Vec<u8>),
}

impl MidiMessage {
    pub fn from_bytes(data: &[u8]) -> Option<MidiMessage> {
        if data.is_empty() {
            return None;
        }

        match data[0] {
            0xF0 => return Some(MidiMessage::SysEx(data.to_vec())),
            0xF2 if data.len() >= 3 => {
                let value = u16::from(data[1] & 0x7F) | (u16::from(data[2] & 0x7F) << 7);
                return Some(MidiMessage::SongPosition(value));
            }
            0xF8 => return Some(MidiMessage::Clock),
            0xFA => return Some(MidiMessage::Start),
            0xFB => return Some(MidiMessage::Continue),
            0xFC => return Some(MidiMessage::Stop),
            _ => {}
        }

        let channel = data[0] & 0x0F;
        match data[0] & 0xF0 {
            0x90 if data.len() >= 3 => Some(MidiMessage::NoteOn {
                channel,
                note: data[1],
                velocity: data[2],
            }),
            0x80 if data.len() >= 3 => Some(MidiMessage::NoteOff {
                channel,
                note: data[1],
                velocity: data[2],
            }),
            0xB0 if data.len() >= 3 => Some(MidiMessage::ControlChange {
                channel,
                controller: data[1],
                value: data[2],
            }),
            0xC0 if data.len() >= 2 => Some(MidiMessage::ProgramChange {
                channel,
                program: data[1],
            }),
            0xE0 if data.len() >= 3 => Some(MidiMessage::PitchBend {
                channel,
                value: u16::from(data[1] & 0x7F) | (u16::from(data[2] & 0x7F) << 7),
            }),
            _ => None,
        }
    }

    /// Encodes the message using its own channel.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode(None)
    }

    /// Encodes the message for the given output channel; channel voice
    /// messages take `channel` instead of the one they carry.
    pub fn to_bytes_on(&self, channel: u8) -> Vec<u8> {
        self.encode(Some(channel))
    }

    fn encode(&self, routed: Option<u8>) -> Vec<u8> {
        let status = |base: u8, own: u8| base | (routed.unwrap_or(own) & 0x0F);
        match self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![status(0x90, *channel), *note, *velocity],
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => vec![status(0x80, *channel), *note, *velocity],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => vec![status(0xB0, *channel), *controller, *value],
            MidiMessage::ProgramChange { channel, program } => {
                vec![status(0xC0, *channel), *program]
            }
            MidiMessage::PitchBend { channel, value } => vec![
                status(0xE0, *channel),
                (value & 0x7F) as u8,
                ((value >> 7) & 0x7F) as u8,
            ],
            MidiMessage::Clock => vec![0xF8],
            MidiMessage::Start => vec![0xFA],
            MidiMessage::Stop => vec![0xFC],
            MidiMessage::Continue => vec![0xFB],
            MidiMessage::SongPosition(beats) => {
                vec![0xF2, (beats & 0x7F) as u8, ((beats >> 7) & 0x7F) as u8]
            }
            MidiMessage::SysEx(data) => data.clone(),
        }
    }

    pub fn is_sysex(&self) -> bool {
        matches!(self, MidiMessage::SysEx(_))
    }
}

/// A MIDI message stamped with the sequencer tick it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiEvent {
    pub timestamp: Pulse,
    pub message: MidiMessage,
}

impl MidiEvent {
    pub fn new(timestamp: Pulse, message: MidiMessage) -> Self {
        Self { timestamp, message }
    }
}
