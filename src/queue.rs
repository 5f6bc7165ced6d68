//! Event queue between the device input callback and the tick loop.
//!
//! Producers only ever append under a short mutex hold; the tick loop takes
//! every pending event in one swap, so the device thread never waits on
//! dispatch work. The queue keeps one ordered sequence per message type and
//! grows without bound.

use std::time::Instant;

use parking_lot::Mutex;

use crate::midi::{ControlEvent, NoteEvent, PitchBendEvent, ProgramEvent};

/// An event captured on the device thread, stamped at enqueue time.
#[derive(Debug, Clone, Copy)]
pub struct Stamped<T> {
    pub event: T,
    pub received: Instant,
}

impl<T> Stamped<T> {
    pub fn now(event: T) -> Self {
        Self {
            event,
            received: Instant::now(),
        }
    }
}

#[derive(Default)]
struct Pending {
    notes: Vec<Stamped<NoteEvent>>,
    controls: Vec<Stamped<ControlEvent>>,
    programs: Vec<Stamped<ProgramEvent>>,
    pitch_bends: Vec<Stamped<PitchBendEvent>>,
}

/// Mutex-guarded queue of controller events.
#[derive(Default)]
pub struct EventQueue {
    pending: Mutex<Pending>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_note(&self, event: NoteEvent) {
        self.pending.lock().notes.push(Stamped::now(event));
    }

    pub fn push_control(&self, event: ControlEvent) {
        self.pending.lock().controls.push(Stamped::now(event));
    }

    pub fn push_program(&self, event: ProgramEvent) {
        self.pending.lock().programs.push(Stamped::now(event));
    }

    pub fn push_pitch_bend(&self, event: PitchBendEvent) {
        self.pending.lock().pitch_bends.push(Stamped::now(event));
    }

    /// Take every queued event, leaving the queue empty.
    pub fn drain(&self) -> DrainedEvents {
        let mut pending = self.pending.lock();
        DrainedEvents {
            notes: std::mem::take(&mut pending.notes),
            controls: std::mem::take(&mut pending.controls),
            programs: std::mem::take(&mut pending.programs),
            pitch_bends: std::mem::take(&mut pending.pitch_bends),
        }
    }

    pub fn is_empty(&self) -> bool {
        let pending = self.pending.lock();
        pending.notes.is_empty()
            && pending.controls.is_empty()
            && pending.programs.is_empty()
            && pending.pitch_bends.is_empty()
    }
}

/// One tick's worth of events, arrival-ordered within each type.
#[derive(Default)]
pub struct DrainedEvents {
    pub notes: Vec<Stamped<NoteEvent>>,
    pub controls: Vec<Stamped<ControlEvent>>,
    pub programs: Vec<Stamped<ProgramEvent>>,
    pub pitch_bends: Vec<Stamped<PitchBendEvent>>,
}

impl DrainedEvents {
    pub fn len(&self) -> usize {
        self.notes.len() + self.controls.len() + self.programs.len() + self.pitch_bends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
