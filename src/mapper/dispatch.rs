//! Tick-thread event matching.

use std::time::Instant;

use tracing::debug;

use crate::mapping::{BehaviorMode, MappingEntry, MessageKind};
use crate::param::ParamHandle;

impl super::MidiMapper {
    /// Drain the queue and process each event: match it against the mapping
    /// table, then fan it out to the active page's listeners. Bind debounce
    /// and capture gate the matching only; listeners see every event.
    pub(crate) fn dispatch_queued(&mut self) {
        let drained = self.input.drain();
        if drained.is_empty() {
            return;
        }

        for stamped in drained.notes {
            let event = stamped.event;
            self.match_and_apply(
                MessageKind::Note,
                event.pitch,
                event.velocity as f32 / 127.0,
                event.channel,
                stamped.received,
            );
            for listener in self.pages.active_listeners() {
                listener.on_note(event);
            }
        }
        for stamped in drained.controls {
            let event = stamped.event;
            self.match_and_apply(
                MessageKind::ControlChange,
                event.control,
                event.value as f32 / 127.0,
                event.channel,
                stamped.received,
            );
            for listener in self.pages.active_listeners() {
                listener.on_control(event);
            }
        }
        for stamped in drained.programs {
            let event = stamped.event;
            // A program change is an edge, not a position; it matches as a
            // full-value press.
            self.match_and_apply(
                MessageKind::ProgramChange,
                event.program,
                1.0,
                event.channel,
                stamped.received,
            );
            for listener in self.pages.active_listeners() {
                listener.on_program_change(event);
            }
        }
        for stamped in drained.pitch_bends {
            let event = stamped.event;
            self.match_and_apply(
                MessageKind::PitchBend,
                0,
                event.value as f32 / 16383.0,
                event.channel,
                stamped.received,
            );
            for listener in self.pages.active_listeners() {
                listener.on_pitch_bend(event);
            }
        }
    }

    /// Match one normalized event against the table and drive the targets of
    /// every entry that matches.
    pub(crate) fn match_and_apply(
        &mut self,
        kind: MessageKind,
        control: u8,
        value: f32,
        channel: u8,
        when: Instant,
    ) {
        self.last_activity = Some(when);
        self.last_activity_bound = false;
        self.activity
            .insert((kind, control), super::ControlActivity { when, value });

        // Tail of a binding gesture; the new mapping must not fire yet.
        if self.bind.in_debounce(when) {
            return;
        }

        self.last_input = describe_input(kind, control, value, channel);

        if self.bind.armed() {
            self.capture_binding(kind, control, channel, when);
            return;
        }

        let active = self.pages.active();
        for entry in self.entries.iter_mut() {
            if !entry.matches(kind, control, channel, active) {
                continue;
            }
            entry.last_activity = Some(when);
            self.last_activity_bound = true;

            let Some(handle) = entry.target.resolve(self.params.as_ref()) else {
                continue;
            };
            if apply_mode(entry, &handle, value, self.negative_edge, self.fine_adjust) {
                handle.pulse_beacon();
                debug!(
                    "{} -> {} = {:.3}",
                    self.last_input,
                    handle.path(),
                    handle.normalized_value()
                );
            }
        }
    }
}

/// Drive `handle` according to the entry's behavior mode. Returns whether
/// the mode fired.
fn apply_mode(
    entry: &MappingEntry,
    handle: &ParamHandle,
    value: f32,
    negative_edge: bool,
    fine_adjust: bool,
) -> bool {
    match entry.mode {
        BehaviorMode::Slider => {
            if entry.increment != 0.0 {
                let mut step = entry.increment / 100.0;
                if fine_adjust {
                    step /= 50.0;
                }
                let cur = handle.normalized_value();
                if value > 0.5 {
                    handle.set_normalized(cur + step);
                } else {
                    handle.set_normalized(cur - step);
                }
            } else {
                // Notes collapse to a binary position.
                let value = if entry.kind == MessageKind::Note {
                    if value > 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    value
                };
                handle.set_normalized(value);
            }
            true
        }
        BehaviorMode::Toggle => {
            if value > 0.0 {
                let flipped = if handle.normalized_value() == 0.0 { 1.0 } else { 0.0 };
                handle.set_raw(flipped);
                true
            } else {
                false
            }
        }
        BehaviorMode::SetValue => {
            if value > 0.0 || negative_edge {
                if entry.increment != 0.0 {
                    handle.increment(entry.increment);
                } else {
                    handle.set_raw(entry.fixed_value);
                }
                true
            } else {
                false
            }
        }
        BehaviorMode::SetValueOnRelease => {
            if value == 0.0 {
                if entry.increment != 0.0 {
                    handle.increment(entry.increment);
                } else {
                    handle.set_raw(entry.fixed_value);
                }
                true
            } else {
                false
            }
        }
        BehaviorMode::Direct => {
            handle.set_raw(value * 127.0);
            true
        }
    }
}

fn describe_input(kind: MessageKind, control: u8, value: f32, channel: u8) -> String {
    let name = match kind {
        MessageKind::ControlChange => "cc",
        MessageKind::Note => "note",
        MessageKind::ProgramChange => "program change",
        MessageKind::PitchBend => "pitchbend",
    };
    if kind == MessageKind::PitchBend {
        format!("{}, value: {:.2}, channel: {}", name, value, channel)
    } else {
        format!("{} {}, value: {:.2}, channel: {}", name, control, value, channel)
    }
}
