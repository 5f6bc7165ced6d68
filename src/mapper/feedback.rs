//! Two-way feedback: mirror target values back to the controller.

use tracing::{info, warn};

use crate::clock::blink_phase;
use crate::mapping::{BehaviorMode, FeedbackControl, MessageKind};

impl super::MidiMapper {
    /// Track the hardware connection. A newly present controller gets the
    /// active page's selection callback; a vanished one gets a reconnect
    /// attempt, and a successful reconnect resyncs feedback. The connected
    /// flag stays down until the next tick sees the port, which is what
    /// routes the fresh connection through the "newly connected" path.
    pub(crate) fn poll_connection(&mut self) {
        if self.port.is_connected() {
            if !self.was_connected {
                info!("Controller connected: {}", self.port.port_name());
                self.pages.notify_page_selected();
            }
            self.was_connected = true;
        } else {
            if self.was_connected {
                warn!("Controller disconnected: {}", self.port.port_name());
            }
            self.was_connected = false;
            if self.port.reconnect() {
                if let Some(input) = self.midi_in.as_mut() {
                    input.reconnect();
                }
                self.resync_two_way();
            }
        }
    }

    /// Emit feedback for every entry whose target value changed since the
    /// last pass, or whose blink phase flipped.
    pub(crate) fn run_feedback(&mut self) {
        let last_blink = self.blink;
        self.blink = blink_phase(self.clock.as_ref());

        if !self.two_way {
            return;
        }

        let blink_flipped = last_blink != self.blink;
        let active = self.pages.active();

        for entry in self.entries.iter_mut() {
            if !entry.two_way {
                continue;
            }
            let Some(handle) = entry.target.resolve(self.params.as_ref()) else {
                continue;
            };
            if entry.page.is_some_and(|p| p != active) {
                continue;
            }

            let out_control = match entry.feedback {
                FeedbackControl::Same => entry.control,
                FeedbackControl::Control(n) => n,
                FeedbackControl::Off => continue,
            };

            // Direct entries track the raw value; everything else the
            // normalized position on the 7-bit scale.
            let cur_value = if entry.mode == BehaviorMode::Direct {
                handle.raw_value() as i32
            } else {
                (handle.normalized_value() * 127.0).round() as i32
            };
            if cur_value == entry.last_sent && !(entry.blink && blink_flipped) {
                continue;
            }

            let on = entry.midi_on_value;
            let off = entry.midi_off_value;
            let out_value = match entry.mode {
                BehaviorMode::Toggle => {
                    if cur_value != 0 && (on != 127 || entry.blink) {
                        if entry.blink {
                            if self.blink {
                                on
                            } else {
                                off
                            }
                        } else {
                            on
                        }
                    } else if cur_value == 0 && off != 0 {
                        off
                    } else {
                        cur_value
                    }
                }
                BehaviorMode::Slider => {
                    // A custom on/off pair defines the output range.
                    if on != 127 || off != 0 {
                        (cur_value as f32 / 127.0 * (on - off) as f32 + off as f32) as i32
                    } else {
                        cur_value
                    }
                }
                BehaviorMode::SetValue | BehaviorMode::SetValueOnRelease => {
                    let raw = handle.raw_value();
                    let lit = if handle.is_bitmask() {
                        let bit = 1i32.checked_shl(entry.fixed_value as u32).unwrap_or(0);
                        (raw as i32) & bit != 0
                    } else {
                        (raw - entry.fixed_value).abs() < 0.0001
                    };
                    if lit {
                        if entry.blink {
                            if self.blink {
                                on
                            } else {
                                off
                            }
                        } else {
                            on
                        }
                    } else {
                        off
                    }
                }
                // Raw passthrough, unclamped; the wire masks it.
                BehaviorMode::Direct => cur_value,
            };

            match entry.kind {
                MessageKind::Note => {
                    self.port
                        .send_note(out_control, out_value, true, entry.channel)
                }
                MessageKind::ControlChange => {
                    self.port.send_cc(out_control, out_value, entry.channel)
                }
                // Program change and pitch bend carry no feedback message;
                // the cache still updates so the entry stays quiet.
                _ => {}
            }
            entry.last_sent = cur_value;
        }
    }

    /// Forget cached feedback values so the next pass re-emits everything.
    pub fn resync_two_way(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.force_resend();
        }
    }

    /// Silence the controller: zero every mapped note and CC output on every
    /// page. Called on shutdown so LEDs and motor faders do not stay lit.
    pub fn zero_all_outputs(&mut self) {
        for entry in &self.entries {
            match entry.kind {
                MessageKind::ControlChange => self.port.send_cc(entry.control, 0, entry.channel),
                MessageKind::Note => self.port.send_note(entry.control, 0, false, entry.channel),
                _ => {}
            }
        }
    }
}
