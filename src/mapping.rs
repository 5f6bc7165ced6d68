//! Mapping entries: which controller address drives which parameter, and
//! how.

use std::fmt;
use std::time::Instant;

use crate::param::BindingTarget;

/// `last_sent` value that forces the next feedback pass to emit.
pub const FORCE_RESEND: i32 = -1;

/// Which MIDI message type a mapping listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MessageKind {
    #[default]
    ControlChange,
    Note,
    ProgramChange,
    PitchBend,
}

impl MessageKind {
    /// Persisted name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::ControlChange => "control",
            MessageKind::Note => "note",
            MessageKind::ProgramChange => "program",
            MessageKind::PitchBend => "pitchbend",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "control" => Some(MessageKind::ControlChange),
            "note" => Some(MessageKind::Note),
            "program" => Some(MessageKind::ProgramChange),
            "pitchbend" => Some(MessageKind::PitchBend),
            _ => None,
        }
    }
}

/// How a matched event drives its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BehaviorMode {
    /// Absolute position, or relative stepping when `increment` is nonzero.
    #[default]
    Slider,
    /// Flip between raw 0 and 1 on press.
    Toggle,
    /// Write a fixed value (or apply an increment) on press.
    SetValue,
    /// Like `SetValue`, firing on release instead.
    SetValueOnRelease,
    /// Raw passthrough: value x 127, no press/release logic.
    Direct,
}

/// Where feedback for an entry goes. Persisted as an integer: -1 self,
/// -2 disabled, otherwise an explicit control number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackControl {
    #[default]
    Same,
    Off,
    Control(u8),
}

impl FeedbackControl {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            -1 => FeedbackControl::Same,
            -2 => FeedbackControl::Off,
            n if (0..=127).contains(&n) => FeedbackControl::Control(n as u8),
            _ => FeedbackControl::Same,
        }
    }

    pub fn as_raw(&self) -> i32 {
        match self {
            FeedbackControl::Same => -1,
            FeedbackControl::Off => -2,
            FeedbackControl::Control(n) => *n as i32,
        }
    }
}

/// One mapping from a controller address to a parameter.
#[derive(Clone)]
pub struct MappingEntry {
    pub kind: MessageKind,
    /// Control number 0-127: CC number, note pitch, or program number.
    /// Pitch-bend entries pin this to 0.
    pub control: u8,
    /// `None` matches any channel.
    pub channel: Option<u8>,
    /// `None` makes the entry pageless (active on every page).
    pub page: Option<usize>,
    pub target: BindingTarget,
    pub mode: BehaviorMode,
    /// Value written by the `SetValue` family.
    pub fixed_value: f32,
    /// Nonzero switches `Slider` to relative stepping and the `SetValue`
    /// family to incrementing.
    pub increment: f32,
    pub midi_on_value: i32,
    pub midi_off_value: i32,
    pub blink: bool,
    pub two_way: bool,
    pub feedback: FeedbackControl,
    /// Last feedback value sent to the controller; [`FORCE_RESEND`] makes
    /// the next pass emit unconditionally.
    pub last_sent: i32,
    pub last_activity: Option<Instant>,
}

impl MappingEntry {
    pub fn new(
        kind: MessageKind,
        control: u8,
        channel: Option<u8>,
        page: Option<usize>,
        target: BindingTarget,
    ) -> Self {
        Self {
            kind,
            // Matching pitch bend only needs the kind; the control number
            // stays pinned so persistence is stable.
            control: if kind == MessageKind::PitchBend { 0 } else { control },
            channel,
            page,
            target,
            mode: BehaviorMode::Slider,
            fixed_value: 0.0,
            increment: 0.0,
            midi_on_value: 127,
            midi_off_value: 0,
            blink: false,
            two_way: true,
            feedback: FeedbackControl::Same,
            last_sent: FORCE_RESEND,
            last_activity: None,
        }
    }

    /// Event match: kind and control number equal, entry pageless or on the
    /// active page, channel wildcard or equal.
    pub fn matches(&self, kind: MessageKind, control: u8, channel: u8, active_page: usize) -> bool {
        self.kind == kind
            && self.control == control
            && self.page.map_or(true, |p| p == active_page)
            && self.channel.map_or(true, |c| c == channel)
    }

    /// Forget the cached feedback value so the next pass re-emits.
    pub fn force_resend(&mut self) {
        self.last_sent = FORCE_RESEND;
    }
}

impl fmt::Display for MappingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.control)?;
        match self.channel {
            Some(ch) => write!(f, " ch:{}", ch)?,
            None => write!(f, " ch:any")?,
        }
        match self.page {
            Some(page) => write!(f, " page:{}", page)?,
            None => write!(f, " pageless")?,
        }
        write!(f, " -> {} [{:?}]", self.target, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: MessageKind, control: u8) -> MappingEntry {
        MappingEntry::new(kind, control, None, Some(0), BindingTarget::none())
    }

    #[test]
    fn test_match_on_kind_and_control() {
        let e = entry(MessageKind::ControlChange, 7);
        assert!(e.matches(MessageKind::ControlChange, 7, 1, 0));
        assert!(!e.matches(MessageKind::ControlChange, 8, 1, 0));
        assert!(!e.matches(MessageKind::Note, 7, 1, 0));
    }

    #[test]
    fn test_channel_wildcard_and_exact() {
        let mut e = entry(MessageKind::Note, 60);
        assert!(e.matches(MessageKind::Note, 60, 5, 0));

        e.channel = Some(2);
        assert!(e.matches(MessageKind::Note, 60, 2, 0));
        assert!(!e.matches(MessageKind::Note, 60, 3, 0));
    }

    #[test]
    fn test_paged_vs_pageless() {
        let mut e = entry(MessageKind::ControlChange, 1);
        e.page = Some(2);
        assert!(e.matches(MessageKind::ControlChange, 1, 1, 2));
        assert!(!e.matches(MessageKind::ControlChange, 1, 1, 0));

        e.page = None;
        assert!(e.matches(MessageKind::ControlChange, 1, 1, 0));
        assert!(e.matches(MessageKind::ControlChange, 1, 1, 7));
    }

    #[test]
    fn test_pitch_bend_pins_control() {
        let e = MappingEntry::new(MessageKind::PitchBend, 99, None, None, BindingTarget::none());
        assert_eq!(e.control, 0);
        assert!(e.matches(MessageKind::PitchBend, 0, 1, 0));
    }

    #[test]
    fn test_feedback_control_raw_round_trip() {
        assert_eq!(FeedbackControl::from_raw(-1), FeedbackControl::Same);
        assert_eq!(FeedbackControl::from_raw(-2), FeedbackControl::Off);
        assert_eq!(FeedbackControl::from_raw(20), FeedbackControl::Control(20));
        assert_eq!(FeedbackControl::from_raw(300), FeedbackControl::Same);

        for fc in [
            FeedbackControl::Same,
            FeedbackControl::Off,
            FeedbackControl::Control(64),
        ] {
            assert_eq!(FeedbackControl::from_raw(fc.as_raw()), fc);
        }
    }

    #[test]
    fn test_new_entry_defaults() {
        let e = entry(MessageKind::ControlChange, 10);
        assert_eq!(e.mode, BehaviorMode::Slider);
        assert_eq!(e.midi_on_value, 127);
        assert_eq!(e.midi_off_value, 0);
        assert!(e.two_way);
        assert_eq!(e.feedback, FeedbackControl::Same);
        assert_eq!(e.last_sent, FORCE_RESEND);
    }
}
