//! MIDI event types and wire codec.
//!
//! Events carry channels 1-16 (wire nibble + 1). Only the channel voice
//! messages the mapping engine consumes are modeled; everything else parses
//! to `None` and is dropped by callers.

use std::fmt;

/// Note on/off. Velocity 0 is a note off, per the MIDI running convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub pitch: u8,
    pub velocity: u8,
    pub channel: u8,
}

/// Control change (CC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlEvent {
    pub control: u8,
    pub value: u8,
    pub channel: u8,
}

/// Program change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramEvent {
    pub program: u8,
    pub channel: u8,
}

/// Pitch bend with the combined 14-bit value (0-16383, center 8192).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchBendEvent {
    pub value: u16,
    pub channel: u8,
}

/// Polyphonic key pressure (aftertouch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureEvent {
    pub pitch: u8,
    pub pressure: u8,
    pub channel: u8,
}

/// A parsed incoming MIDI event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    Note(NoteEvent),
    Control(ControlEvent),
    Program(ProgramEvent),
    PitchBend(PitchBendEvent),
    Pressure(PressureEvent),
}

impl MidiEvent {
    /// Parse a MIDI event from raw bytes.
    ///
    /// Note Off arrives as a `NoteEvent` with velocity 0. Returns `None` for
    /// system messages, channel pressure, and truncated input; running
    /// status is not supported.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;
        if status < 0x80 || status >= 0xF0 {
            return None;
        }

        let channel = (status & 0x0F) + 1;

        match status & 0xF0 {
            0x80 => {
                if data.len() < 3 {
                    return None;
                }
                Some(MidiEvent::Note(NoteEvent {
                    pitch: data[1] & 0x7F,
                    velocity: 0,
                    channel,
                }))
            }
            0x90 => {
                if data.len() < 3 {
                    return None;
                }
                Some(MidiEvent::Note(NoteEvent {
                    pitch: data[1] & 0x7F,
                    velocity: data[2] & 0x7F,
                    channel,
                }))
            }
            0xA0 => {
                if data.len() < 3 {
                    return None;
                }
                Some(MidiEvent::Pressure(PressureEvent {
                    pitch: data[1] & 0x7F,
                    pressure: data[2] & 0x7F,
                    channel,
                }))
            }
            0xB0 => {
                if data.len() < 3 {
                    return None;
                }
                Some(MidiEvent::Control(ControlEvent {
                    control: data[1] & 0x7F,
                    value: data[2] & 0x7F,
                    channel,
                }))
            }
            0xC0 => {
                if data.len() < 2 {
                    return None;
                }
                Some(MidiEvent::Program(ProgramEvent {
                    program: data[1] & 0x7F,
                    channel,
                }))
            }
            0xE0 => {
                if data.len() < 3 {
                    return None;
                }
                let lsb = (data[1] & 0x7F) as u16;
                let msb = (data[2] & 0x7F) as u16;
                Some(MidiEvent::PitchBend(PitchBendEvent {
                    value: (msb << 7) | lsb,
                    channel,
                }))
            }
            _ => None,
        }
    }

    /// Encode the event back to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiEvent::Note(NoteEvent { pitch, velocity, channel }) => {
                vec![0x90 | wire_channel(channel), pitch & 0x7F, velocity & 0x7F]
            }
            MidiEvent::Control(ControlEvent { control, value, channel }) => {
                vec![0xB0 | wire_channel(channel), control & 0x7F, value & 0x7F]
            }
            MidiEvent::Program(ProgramEvent { program, channel }) => {
                vec![0xC0 | wire_channel(channel), program & 0x7F]
            }
            MidiEvent::PitchBend(PitchBendEvent { value, channel }) => {
                vec![
                    0xE0 | wire_channel(channel),
                    (value & 0x7F) as u8,
                    ((value >> 7) & 0x7F) as u8,
                ]
            }
            MidiEvent::Pressure(PressureEvent { pitch, pressure, channel }) => {
                vec![0xA0 | wire_channel(channel), pitch & 0x7F, pressure & 0x7F]
            }
        }
    }

    /// Channel of the event (1-16).
    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::Note(e) => e.channel,
            MidiEvent::Control(e) => e.channel,
            MidiEvent::Program(e) => e.channel,
            MidiEvent::PitchBend(e) => e.channel,
            MidiEvent::Pressure(e) => e.channel,
        }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiEvent::Note(NoteEvent { pitch, velocity, channel }) => {
                write!(f, "Note ch:{} p:{} v:{}", channel, pitch, velocity)
            }
            MidiEvent::Control(ControlEvent { control, value, channel }) => {
                write!(f, "CC ch:{} cc:{} v:{}", channel, control, value)
            }
            MidiEvent::Program(ProgramEvent { program, channel }) => {
                write!(f, "Program ch:{} p:{}", channel, program)
            }
            MidiEvent::PitchBend(PitchBendEvent { value, channel }) => {
                write!(f, "PitchBend ch:{} v:{}", channel, value)
            }
            MidiEvent::Pressure(PressureEvent { pitch, pressure, channel }) => {
                write!(f, "Pressure ch:{} p:{} v:{}", channel, pitch, pressure)
            }
        }
    }
}

/// 1-16 channel to wire nibble. Out-of-range input clamps into the nibble.
pub(crate) fn wire_channel(channel: u8) -> u8 {
    channel.saturating_sub(1) & 0x0F
}

/// MIDI value conversion utilities
pub mod convert {
    /// Normalize a 7-bit value (0-127) to [0, 1].
    pub fn normalized_from_7bit(value: u8) -> f32 {
        value as f32 / 127.0
    }

    /// Normalize a 14-bit value (0-16383) to [0, 1].
    pub fn normalized_from_14bit(value: u16) -> f32 {
        value as f32 / 16383.0
    }

    /// Scale [0, 1] back to a 7-bit value.
    pub fn to_7bit(normalized: f32) -> u8 {
        (normalized.clamp(0.0, 1.0) * 127.0).round() as u8
    }

    /// Pitch-bend amount in semitones for a 14-bit bend value and a bend
    /// range setting: `(value - 8192) / (8192 / range)`.
    pub fn bend_semitones(value: u16, range: f32) -> f32 {
        (value as f32 - 8192.0) / (8192.0 / range)
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_parsing() {
        let data = vec![0x90, 60, 100];
        let event = MidiEvent::parse(&data).unwrap();

        assert_eq!(
            event,
            MidiEvent::Note(NoteEvent {
                pitch: 60,
                velocity: 100,
                channel: 1,
            })
        );
    }

    #[test]
    fn test_note_off_forms() {
        // Real Note Off and Note On with velocity 0 both land as velocity 0.
        let off = MidiEvent::parse(&[0x80, 60, 64]).unwrap();
        let on_zero = MidiEvent::parse(&[0x90, 60, 0]).unwrap();

        assert_eq!(
            off,
            MidiEvent::Note(NoteEvent {
                pitch: 60,
                velocity: 0,
                channel: 1,
            })
        );
        assert_eq!(off, on_zero);
    }

    #[test]
    fn test_control_change_channel() {
        let event = MidiEvent::parse(&[0xB2, 7, 100]).unwrap();

        assert_eq!(
            event,
            MidiEvent::Control(ControlEvent {
                control: 7,
                value: 100,
                channel: 3,
            })
        );
    }

    #[test]
    fn test_pitch_bend_center() {
        let event = MidiEvent::parse(&[0xE0, 0x00, 0x40]).unwrap();

        assert_eq!(
            event,
            MidiEvent::PitchBend(PitchBendEvent {
                value: 8192,
                channel: 1,
            })
        );
    }

    #[test]
    fn test_program_change() {
        let event = MidiEvent::parse(&[0xC5, 12]).unwrap();

        assert_eq!(
            event,
            MidiEvent::Program(ProgramEvent {
                program: 12,
                channel: 6,
            })
        );
    }

    #[test]
    fn test_system_messages_ignored() {
        assert_eq!(MidiEvent::parse(&[0xF8]), None);
        assert_eq!(MidiEvent::parse(&[0xFE]), None);
        assert_eq!(MidiEvent::parse(&[]), None);
        // Truncated channel message
        assert_eq!(MidiEvent::parse(&[0x90, 60]), None);
    }

    #[test]
    fn test_encode_round_trip() {
        let events = [
            MidiEvent::Note(NoteEvent { pitch: 60, velocity: 100, channel: 1 }),
            MidiEvent::Control(ControlEvent { control: 7, value: 127, channel: 16 }),
            MidiEvent::Program(ProgramEvent { program: 5, channel: 2 }),
            MidiEvent::PitchBend(PitchBendEvent { value: 16383, channel: 4 }),
        ];

        for event in events {
            assert_eq!(MidiEvent::parse(&event.encode()), Some(event));
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(convert::normalized_from_7bit(0), 0.0);
        assert_eq!(convert::normalized_from_7bit(127), 1.0);
        assert!((convert::normalized_from_7bit(64) - 0.504).abs() < 0.001);

        assert_eq!(convert::normalized_from_14bit(0), 0.0);
        assert_eq!(convert::normalized_from_14bit(16383), 1.0);

        assert_eq!(convert::to_7bit(0.0), 0);
        assert_eq!(convert::to_7bit(1.0), 127);
        assert_eq!(convert::to_7bit(2.0), 127);
    }

    #[test]
    fn test_bend_semitones() {
        assert_eq!(convert::bend_semitones(8192, 2.0), 0.0);
        assert!((convert::bend_semitones(16383, 2.0) - 2.0).abs() < 0.001);
        assert_eq!(convert::bend_semitones(0, 2.0), -2.0);
        assert_eq!(convert::bend_semitones(12288, 12.0), 6.0);
    }
}
