//! Page switching.

use tracing::info;

use crate::mapping::MessageKind;

impl super::MidiMapper {
    /// Switch the active page: silence the old page's outputs, notify the
    /// new page's listeners, beacon its targets, then resync feedback so the
    /// next pass repaints the controller.
    pub fn set_page(&mut self, page: usize) {
        let old = self.pages.active();
        self.pages.set_active(page);
        let new = self.pages.active();
        if new == old {
            return;
        }
        info!("Controller page: {}", new);
        self.zero_page_outputs(old);
        self.pages.notify_page_selected();
        self.highlight_page_targets();
        self.resync_two_way();
    }

    /// Zero the outputs of `page`'s entries. Pageless entries stay lit; they
    /// are live on the next page too.
    fn zero_page_outputs(&mut self, page: usize) {
        for entry in &self.entries {
            if entry.page != Some(page) {
                continue;
            }
            match entry.kind {
                MessageKind::ControlChange => self.port.send_cc(entry.control, 0, entry.channel),
                MessageKind::Note => self.port.send_note(entry.control, 0, false, entry.channel),
                _ => {}
            }
        }
    }

    /// Pulse the beacon of every resolvable target on the active page.
    fn highlight_page_targets(&self) {
        let active = self.pages.active();
        for entry in &self.entries {
            if entry.page != Some(active) {
                continue;
            }
            if let Some(handle) = entry.target.resolve(self.params.as_ref()) {
                handle.pulse_beacon();
            }
        }
    }
}
