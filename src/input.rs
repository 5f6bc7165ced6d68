//! Device-thread input stage.
//!
//! The midir callback hands parsed events to [`InputDispatcher`]. Only
//! realtime-safe work happens here: note passthrough, modulation atomics,
//! and enqueueing. Mapping dispatch and feedback run later on the tick
//! thread (see [`crate::mapper`]).

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;

use atomic_float::AtomicF32;
use parking_lot::Mutex;
use tracing::{info, trace};

use crate::midi::{
    convert, ControlEvent, MidiEvent, NoteEvent, PitchBendEvent, PressureEvent, ProgramEvent,
};
use crate::modulation::Modulations;
use crate::queue::{DrainedEvents, EventQueue};

/// Sink for notes passed through to the host instrument.
pub trait NoteOutput: Send + Sync {
    /// Pitch already carries the note offset; velocity is scaled and capped
    /// at 127. `voice` is `Some` when channel-as-voice routing is on.
    fn play_note(&self, pitch: i32, velocity: u8, voice: Option<usize>);

    fn send_pressure(&self, pitch: u8, pressure: u8);
}

/// Input stage shared with the device callback thread.
pub struct InputDispatcher {
    queue: EventQueue,
    modulation: Arc<Modulations>,
    note_out: Mutex<Option<Arc<dyn NoteOutput>>>,
    enabled: AtomicBool,
    print_input: AtomicBool,
    velocity_mult: AtomicF32,
    note_offset: AtomicI32,
    pitch_bend_range: AtomicF32,
    mod_wheel_cc: AtomicU8,
    use_channel_as_voice: AtomicBool,
}

impl InputDispatcher {
    pub fn new(modulation: Arc<Modulations>) -> Self {
        Self {
            queue: EventQueue::new(),
            modulation,
            note_out: Mutex::new(None),
            enabled: AtomicBool::new(true),
            print_input: AtomicBool::new(false),
            velocity_mult: AtomicF32::new(1.0),
            note_offset: AtomicI32::new(0),
            pitch_bend_range: AtomicF32::new(2.0),
            mod_wheel_cc: AtomicU8::new(1),
            use_channel_as_voice: AtomicBool::new(false),
        }
    }

    pub fn set_note_output(&self, out: Option<Arc<dyn NoteOutput>>) {
        *self.note_out.lock() = out;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_print_input(&self, print: bool) {
        self.print_input.store(print, Ordering::Relaxed);
    }

    pub fn set_velocity_mult(&self, mult: f32) {
        self.velocity_mult.store(mult, Ordering::Relaxed);
    }

    pub fn set_note_offset(&self, offset: i32) {
        self.note_offset.store(offset, Ordering::Relaxed);
    }

    pub fn set_pitch_bend_range(&self, semitones: f32) {
        self.pitch_bend_range.store(semitones, Ordering::Relaxed);
    }

    pub fn set_mod_wheel_cc(&self, cc: u8) {
        self.mod_wheel_cc.store(cc, Ordering::Relaxed);
    }

    pub fn set_use_channel_as_voice(&self, use_it: bool) {
        self.use_channel_as_voice.store(use_it, Ordering::Relaxed);
    }

    pub fn modulation(&self) -> &Modulations {
        &self.modulation
    }

    /// Route a parsed event to its typed handler.
    pub fn on_event(&self, event: MidiEvent) {
        match event {
            MidiEvent::Note(e) => self.on_note(e),
            MidiEvent::Control(e) => self.on_control(e),
            MidiEvent::Program(e) => self.on_program_change(e),
            MidiEvent::PitchBend(e) => self.on_pitch_bend(e),
            MidiEvent::Pressure(e) => self.on_pressure(e),
        }
    }

    pub fn on_note(&self, note: NoteEvent) {
        if !self.enabled() {
            return;
        }
        self.log_input(MidiEvent::Note(note));

        let pitch = note.pitch as i32 + self.note_offset.load(Ordering::Relaxed);
        let velocity =
            (note.velocity as f32 * self.velocity_mult.load(Ordering::Relaxed)).min(127.0) as u8;
        if let Some(out) = self.note_out.lock().as_ref() {
            out.play_note(pitch, velocity, self.voice_for(note.channel));
        }

        self.queue.push_note(note);
    }

    pub fn on_control(&self, control: ControlEvent) {
        if !self.enabled() {
            return;
        }
        self.log_input(MidiEvent::Control(control));

        if control.control == self.mod_wheel_cc.load(Ordering::Relaxed) {
            self.modulation.set_mod_wheel(
                self.voice_for(control.channel),
                convert::normalized_from_7bit(control.value),
            );
        }

        self.queue.push_control(control);
    }

    pub fn on_program_change(&self, program: ProgramEvent) {
        if !self.enabled() {
            return;
        }
        self.log_input(MidiEvent::Program(program));

        self.queue.push_program(program);
    }

    pub fn on_pitch_bend(&self, bend: PitchBendEvent) {
        if !self.enabled() {
            return;
        }
        self.log_input(MidiEvent::PitchBend(bend));

        let amount =
            convert::bend_semitones(bend.value, self.pitch_bend_range.load(Ordering::Relaxed));
        self.modulation
            .set_pitch_bend(self.voice_for(bend.channel), amount);

        self.queue.push_pitch_bend(bend);
    }

    /// Pressure is immediate-only: it feeds modulation and the note output
    /// but never reaches mapping dispatch.
    pub fn on_pressure(&self, pressure: PressureEvent) {
        if !self.enabled() {
            return;
        }
        self.log_input(MidiEvent::Pressure(pressure));

        self.modulation.set_pressure(
            self.voice_for(pressure.channel),
            convert::normalized_from_7bit(pressure.pressure),
        );
        if let Some(out) = self.note_out.lock().as_ref() {
            out.send_pressure(pressure.pitch, pressure.pressure);
        }
    }

    /// Take everything queued since the last tick.
    pub fn drain(&self) -> DrainedEvents {
        self.queue.drain()
    }

    fn voice_for(&self, channel: u8) -> Option<usize> {
        if self.use_channel_as_voice.load(Ordering::Relaxed) {
            Some(channel.saturating_sub(1) as usize)
        } else {
            None
        }
    }

    fn log_input(&self, event: MidiEvent) {
        if self.print_input.load(Ordering::Relaxed) {
            info!("midi in: {}", event);
        } else {
            trace!("midi in: {}", event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingNotes {
        notes: Mutex<Vec<(i32, u8, Option<usize>)>>,
        pressures: Mutex<Vec<(u8, u8)>>,
    }

    impl NoteOutput for RecordingNotes {
        fn play_note(&self, pitch: i32, velocity: u8, voice: Option<usize>) {
            self.notes.lock().push((pitch, velocity, voice));
        }

        fn send_pressure(&self, pitch: u8, pressure: u8) {
            self.pressures.lock().push((pitch, pressure));
        }
    }

    fn dispatcher_with_notes() -> (InputDispatcher, Arc<RecordingNotes>) {
        let dispatcher = InputDispatcher::new(Arc::new(Modulations::new()));
        let notes = Arc::new(RecordingNotes::default());
        dispatcher.set_note_output(Some(notes.clone()));
        (dispatcher, notes)
    }

    #[test]
    fn test_disabled_drops_everything() {
        let (dispatcher, notes) = dispatcher_with_notes();
        dispatcher.set_enabled(false);

        dispatcher.on_note(NoteEvent { pitch: 60, velocity: 100, channel: 1 });
        dispatcher.on_control(ControlEvent { control: 7, value: 64, channel: 1 });

        assert!(dispatcher.drain().is_empty());
        assert!(notes.notes.lock().is_empty());
    }

    #[test]
    fn test_note_passthrough_scaling() {
        let (dispatcher, notes) = dispatcher_with_notes();
        dispatcher.set_velocity_mult(2.0);
        dispatcher.set_note_offset(12);

        dispatcher.on_note(NoteEvent { pitch: 60, velocity: 100, channel: 1 });

        // Scaled velocity caps at 127, pitch takes the offset.
        assert_eq!(notes.notes.lock()[0], (72, 127, None));

        // The queued event keeps the raw values.
        let drained = dispatcher.drain();
        assert_eq!(drained.notes[0].event.velocity, 100);
        assert_eq!(drained.notes[0].event.pitch, 60);
    }

    #[test]
    fn test_channel_as_voice_routing() {
        let (dispatcher, notes) = dispatcher_with_notes();
        dispatcher.set_use_channel_as_voice(true);

        dispatcher.on_note(NoteEvent { pitch: 60, velocity: 90, channel: 3 });
        assert_eq!(notes.notes.lock()[0].2, Some(2));

        dispatcher.on_pitch_bend(PitchBendEvent { value: 16383, channel: 3 });
        let bend = dispatcher.modulation().pitch_bend(Some(2));
        assert!((bend - 2.0).abs() < 0.001);
        assert_eq!(dispatcher.modulation().pitch_bend(None), 0.0);
    }

    #[test]
    fn test_mod_wheel_routes_and_still_queues() {
        let (dispatcher, _) = dispatcher_with_notes();
        dispatcher.set_mod_wheel_cc(74);

        dispatcher.on_control(ControlEvent { control: 74, value: 127, channel: 1 });
        dispatcher.on_control(ControlEvent { control: 7, value: 64, channel: 1 });

        assert_eq!(dispatcher.modulation().mod_wheel(None), 1.0);
        assert_eq!(dispatcher.drain().controls.len(), 2);
    }

    #[test]
    fn test_global_pitch_bend() {
        let (dispatcher, _) = dispatcher_with_notes();
        dispatcher.set_pitch_bend_range(12.0);

        dispatcher.on_pitch_bend(PitchBendEvent { value: 12288, channel: 1 });
        assert_eq!(dispatcher.modulation().pitch_bend(None), 6.0);
        assert_eq!(dispatcher.drain().pitch_bends.len(), 1);
    }

    #[test]
    fn test_pressure_never_queued() {
        let (dispatcher, notes) = dispatcher_with_notes();

        dispatcher.on_pressure(PressureEvent { pitch: 60, pressure: 80, channel: 1 });

        assert!(dispatcher.drain().is_empty());
        assert_eq!(notes.pressures.lock()[0], (60, 80));
        let expected = 80.0 / 127.0;
        assert!((dispatcher.modulation().pressure(None) - expected).abs() < 0.0001);
    }
}
