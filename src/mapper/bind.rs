//! Interactive bind capture.
//!
//! In bind mode the host points at a parameter, the user touches a control,
//! and the next incoming event becomes a mapping instead of driving the
//! table.

use std::time::{Duration, Instant};

use tracing::info;

use crate::mapping::MessageKind;
use crate::param::{BindingTarget, ParamHandle};

/// Window after a completed bind during which events do not match, so the
/// tail of the binding gesture cannot retrigger the mapping it just created.
pub const BIND_DEBOUNCE: Duration = Duration::from_millis(500);

/// Capture state. Armed while bind mode is on and a target is pending.
pub(crate) struct BindCapture {
    pub(crate) bind_mode: bool,
    pub(crate) pending: Option<ParamHandle>,
    pub(crate) last_bind: Option<Instant>,
}

impl BindCapture {
    pub(crate) fn new() -> Self {
        Self {
            bind_mode: false,
            pending: None,
            last_bind: None,
        }
    }

    pub(crate) fn armed(&self) -> bool {
        self.bind_mode && self.pending.is_some()
    }

    /// Whether `now` falls inside the post-bind debounce window.
    pub(crate) fn in_debounce(&self, now: Instant) -> bool {
        self.last_bind
            .is_some_and(|bound| now.duration_since(bound) < BIND_DEBOUNCE)
    }
}

impl super::MidiMapper {
    pub fn set_bind_mode(&mut self, on: bool) {
        self.bind.bind_mode = on;
        info!("Bind mode {}", if on { "on" } else { "off" });
    }

    pub fn bind_mode(&self) -> bool {
        self.bind.bind_mode
    }

    /// Set or clear the parameter the next incoming event should bind.
    pub fn set_bind_target(&mut self, target: Option<ParamHandle>) {
        self.bind.pending = target;
    }

    /// Consume one event as a bind gesture: create the mapping on the active
    /// page, pinned to the event's channel, and start the debounce window.
    pub(crate) fn capture_binding(
        &mut self,
        kind: MessageKind,
        control: u8,
        channel: u8,
        when: Instant,
    ) {
        let Some(handle) = self.bind.pending.take() else {
            return;
        };
        info!("Bound {} {} to {}", kind.as_str(), control, handle.path());
        self.add_mapping(kind, control, Some(channel), BindingTarget::Control(handle));
        self.bind.last_bind = Some(when);
    }
}
