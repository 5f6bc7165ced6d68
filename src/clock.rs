//! Musical time for the feedback blink phase.
//!
//! Blinking LEDs flash in time with the transport: the phase flips every
//! half beat. Hosts that own musical time implement [`TransportClock`];
//! standalone use gets a free-running [`TempoClock`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use atomic_float::AtomicF64;

/// Source of musical time.
pub trait TransportClock: Send + Sync {
    /// Position within the current measure, in `[0, 1)`.
    fn measure_pos(&self) -> f64;

    /// Beats per measure of the current time signature.
    fn beats_per_measure(&self) -> u32;
}

/// Blink phase at the clock's current position. Flips every half beat.
pub fn blink_phase(clock: &dyn TransportClock) -> bool {
    (clock.measure_pos() * clock.beats_per_measure() as f64 * 2.0) as i32 % 2 == 0
}

/// Free-running wall-clock transport at a fixed tempo.
pub struct TempoClock {
    started: Instant,
    tempo_bpm: AtomicF64,
    beats_per_measure: AtomicU32,
}

impl TempoClock {
    pub fn new(tempo_bpm: f64, beats_per_measure: u32) -> Self {
        Self {
            started: Instant::now(),
            tempo_bpm: AtomicF64::new(tempo_bpm.max(1.0)),
            beats_per_measure: AtomicU32::new(beats_per_measure.max(1)),
        }
    }

    pub fn set_tempo(&self, bpm: f64) {
        self.tempo_bpm.store(bpm.max(1.0), Ordering::Relaxed);
    }
}

impl TransportClock for TempoClock {
    fn measure_pos(&self) -> f64 {
        let beats = self.started.elapsed().as_secs_f64()
            * self.tempo_bpm.load(Ordering::Relaxed)
            / 60.0;
        let measures = beats / self.beats_per_measure.load(Ordering::Relaxed) as f64;
        measures.fract()
    }

    fn beats_per_measure(&self) -> u32 {
        self.beats_per_measure.load(Ordering::Relaxed)
    }
}

/// Transport pinned to an externally set position.
pub struct ManualClock {
    pos: AtomicF64,
    beats_per_measure: AtomicU32,
}

impl ManualClock {
    pub fn new(beats_per_measure: u32) -> Self {
        Self {
            pos: AtomicF64::new(0.0),
            beats_per_measure: AtomicU32::new(beats_per_measure.max(1)),
        }
    }

    /// Set the measure position. Wraps into `[0, 1)`.
    pub fn set_pos(&self, pos: f64) {
        self.pos.store(pos.rem_euclid(1.0), Ordering::Relaxed);
    }
}

impl TransportClock for ManualClock {
    fn measure_pos(&self) -> f64 {
        self.pos.load(Ordering::Relaxed)
    }

    fn beats_per_measure(&self) -> u32 {
        self.beats_per_measure.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blink_flips_every_half_beat() {
        let clock = ManualClock::new(4);

        clock.set_pos(0.0);
        assert!(blink_phase(&clock));

        // One half beat into a 4/4 measure.
        clock.set_pos(0.125);
        assert!(!blink_phase(&clock));

        clock.set_pos(0.25);
        assert!(blink_phase(&clock));
    }

    #[test]
    fn manual_pos_wraps_into_unit_range() {
        let clock = ManualClock::new(4);
        clock.set_pos(2.75);
        assert!((clock.measure_pos() - 0.75).abs() < 1e-9);
        clock.set_pos(-0.25);
        assert!((clock.measure_pos() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn tempo_clock_stays_in_unit_range() {
        let clock = TempoClock::new(120.0, 4);
        let pos = clock.measure_pos();
        assert!((0.0..1.0).contains(&pos));
        assert_eq!(clock.beats_per_measure(), 4);
    }
}
