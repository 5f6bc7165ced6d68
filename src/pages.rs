//! Page registry and listener fan-out.
//!
//! Mappings can be scoped to one of [`MAX_PAGES`] pages so a small physical
//! controller can drive several banks of parameters. Listeners register per
//! page; only the active page's listeners see incoming events, and each
//! listener is told when its page becomes the active one.

use std::sync::Arc;

use crate::midi::{ControlEvent, NoteEvent, PitchBendEvent, ProgramEvent};

/// Number of mapping pages a controller can address.
pub const MAX_PAGES: usize = 10;

/// Receives raw controller events for the page it registered on.
///
/// Every method defaults to a no-op so implementors only override what they
/// consume.
pub trait MidiListener: Send + Sync {
    fn on_note(&self, _note: NoteEvent) {}
    fn on_control(&self, _control: ControlEvent) {}
    fn on_program_change(&self, _program: ProgramEvent) {}
    fn on_pitch_bend(&self, _bend: PitchBendEvent) {}

    /// Called when the page this listener registered on becomes active.
    fn controller_page_selected(&self) {}
}

/// Active page index plus the per-page listener lists.
pub struct PageRegistry {
    active: usize,
    listeners: Vec<Vec<Arc<dyn MidiListener>>>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self {
            active: 0,
            listeners: (0..MAX_PAGES).map(|_| Vec::new()).collect(),
        }
    }

    /// Currently active page index.
    pub fn active(&self) -> usize {
        self.active
    }

    /// Set the active page. Out-of-range indices clamp to the last page.
    pub fn set_active(&mut self, page: usize) {
        self.active = page.min(MAX_PAGES - 1);
    }

    /// Register a listener on `page`. If that page is already active, the
    /// listener gets its `controller_page_selected` callback immediately.
    pub fn add_listener(&mut self, page: usize, listener: Arc<dyn MidiListener>) {
        let page = page.min(MAX_PAGES - 1);
        if page == self.active {
            listener.controller_page_selected();
        }
        self.listeners[page].push(listener);
    }

    /// Remove a listener from every page it registered on.
    pub fn remove_listener(&mut self, listener: &Arc<dyn MidiListener>) {
        for page in self.listeners.iter_mut() {
            page.retain(|registered| !Arc::ptr_eq(registered, listener));
        }
    }

    /// Listeners registered on the active page.
    pub fn active_listeners(&self) -> &[Arc<dyn MidiListener>] {
        &self.listeners[self.active]
    }

    /// Tell the active page's listeners that their page was selected.
    pub fn notify_page_selected(&self) {
        for listener in &self.listeners[self.active] {
            listener.controller_page_selected();
        }
    }
}

impl Default for PageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
