//! Lock-free modulation state shared with the audio side.
//!
//! The device input callback writes, the host's voices read, so every field
//! is an atomic float. Pitch bend is in semitones; mod wheel and pressure
//! are normalized to [0, 1]. `None` selects the global slot, `Some(v)` one
//! of the per-voice slots (channel-as-voice routing).

use std::sync::atomic::Ordering;

use atomic_float::AtomicF32;

/// Number of per-voice modulation slots, one per MIDI channel.
pub const NUM_VOICES: usize = 16;

#[derive(Default)]
struct Slot {
    pitch_bend: AtomicF32,
    mod_wheel: AtomicF32,
    pressure: AtomicF32,
}

/// Modulation values for the global slot plus each voice.
#[derive(Default)]
pub struct Modulations {
    global: Slot,
    voices: [Slot; NUM_VOICES],
}

impl Modulations {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, voice: Option<usize>) -> &Slot {
        match voice {
            Some(v) => self.voices.get(v).unwrap_or(&self.global),
            None => &self.global,
        }
    }

    pub fn set_pitch_bend(&self, voice: Option<usize>, semitones: f32) {
        self.slot(voice).pitch_bend.store(semitones, Ordering::Relaxed);
    }

    pub fn pitch_bend(&self, voice: Option<usize>) -> f32 {
        self.slot(voice).pitch_bend.load(Ordering::Relaxed)
    }

    pub fn set_mod_wheel(&self, voice: Option<usize>, value: f32) {
        self.slot(voice).mod_wheel.store(value, Ordering::Relaxed);
    }

    pub fn mod_wheel(&self, voice: Option<usize>) -> f32 {
        self.slot(voice).mod_wheel.load(Ordering::Relaxed)
    }

    pub fn set_pressure(&self, voice: Option<usize>, value: f32) {
        self.slot(voice).pressure.store(value, Ordering::Relaxed);
    }

    pub fn pressure(&self, voice: Option<usize>) -> f32 {
        self.slot(voice).pressure.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_zero() {
        let m = Modulations::new();
        assert_eq!(m.pitch_bend(None), 0.0);
        assert_eq!(m.mod_wheel(Some(3)), 0.0);
        assert_eq!(m.pressure(Some(15)), 0.0);
    }

    #[test]
    fn test_voice_slots_are_independent() {
        let m = Modulations::new();
        m.set_pitch_bend(Some(0), 2.0);
        m.set_pitch_bend(Some(1), -1.0);
        m.set_pitch_bend(None, 0.5);

        assert_eq!(m.pitch_bend(Some(0)), 2.0);
        assert_eq!(m.pitch_bend(Some(1)), -1.0);
        assert_eq!(m.pitch_bend(None), 0.5);
    }

    #[test]
    fn test_out_of_range_voice_falls_back_to_global() {
        let m = Modulations::new();
        m.set_mod_wheel(Some(99), 0.75);
        assert_eq!(m.mod_wheel(None), 0.75);
    }
}
