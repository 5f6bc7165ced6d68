//! Mapping engine core.
//!
//! `MidiMapper` owns the mapping table and runs the periodic tick:
//! - Poll the controller connection and reconnect after an unplug
//! - Drain queued events, match them against entries, drive targets
//! - Fan drained events out to the active page's listeners
//! - Walk the two-way feedback pass (LEDs, motor faders)
//!
//! All mutation happens on the tick thread. The MIDI input side only
//! enqueues (see [`InputDispatcher`](crate::input::InputDispatcher)).

mod bind;
mod dispatch;
mod feedback;
mod paging;


pub use bind::BIND_DEBOUNCE;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::clock::TransportClock;
use crate::config::{ControllerConfig, MappingConfig};
use crate::device::{InputConnection, MidiSendPort};
use crate::input::InputDispatcher;
use crate::mapping::{MappingEntry, MessageKind};
use crate::pages::{MidiListener, PageRegistry};
use crate::param::{BindingTarget, ParamHandle, ParamProvider};

use bind::BindCapture;

/// Last seen time and normalized value for one controller address.
#[derive(Debug, Clone, Copy)]
pub struct ControlActivity {
    pub when: Instant,
    pub value: f32,
}

/// The mapping engine. One instance per controller.
pub struct MidiMapper {
    pub(crate) input: Arc<InputDispatcher>,
    pub(crate) params: Arc<dyn ParamProvider>,
    pub(crate) port: Box<dyn MidiSendPort>,
    pub(crate) midi_in: Option<InputConnection>,
    pub(crate) clock: Arc<dyn TransportClock>,
    pub(crate) entries: Vec<MappingEntry>,
    pub(crate) pages: PageRegistry,
    pub(crate) bind: BindCapture,
    /// Per-address activity, kept for every incoming event whether or not a
    /// mapping matched it.
    pub(crate) activity: HashMap<(MessageKind, u8), ControlActivity>,
    pub(crate) last_activity: Option<Instant>,
    /// Whether the most recent event matched at least one mapping.
    pub(crate) last_activity_bound: bool,
    pub(crate) last_input: String,
    /// Gates the entire feedback pass; entries also carry their own flag.
    pub(crate) two_way: bool,
    /// When set, the SetValue family also fires on release.
    pub(crate) negative_edge: bool,
    /// New slider mappings start in relative stepping mode.
    pub(crate) incremental_sliders: bool,
    /// Session modifier: relative slider steps shrink by 50x while held.
    pub(crate) fine_adjust: bool,
    pub(crate) blink: bool,
    pub(crate) was_connected: bool,
}

impl MidiMapper {
    pub fn new(
        input: Arc<InputDispatcher>,
        params: Arc<dyn ParamProvider>,
        port: Box<dyn MidiSendPort>,
        clock: Arc<dyn TransportClock>,
    ) -> Self {
        Self {
            input,
            params,
            port,
            midi_in: None,
            clock,
            entries: Vec::new(),
            pages: PageRegistry::new(),
            bind: BindCapture::new(),
            activity: HashMap::new(),
            last_activity: None,
            last_activity_bound: false,
            last_input: String::new(),
            two_way: true,
            negative_edge: false,
            incremental_sliders: false,
            fine_adjust: false,
            blink: false,
            was_connected: false,
        }
    }

    /// Attach the input connection so an unplugged controller gets both
    /// directions re-opened together.
    pub fn attach_input(&mut self, conn: InputConnection) {
        self.midi_in = Some(conn);
    }

    /// Apply controller-level settings from a loaded config.
    pub fn apply_settings(&mut self, config: &ControllerConfig) {
        self.two_way = config.two_way;
        self.negative_edge = config.negative_edge;
        self.incremental_sliders = config.incremental_sliders;
        self.input.set_velocity_mult(config.velocity_mult);
        self.input.set_note_offset(config.note_offset);
        self.input.set_pitch_bend_range(config.pitch_bend_range);
        self.input.set_mod_wheel_cc(config.mod_wheel_cc);
        self.input
            .set_use_channel_as_voice(config.use_channel_as_voice);
        self.input.set_print_input(config.print_input);
    }

    /// One engine tick.
    pub fn tick(&mut self) {
        self.poll_connection();
        self.dispatch_queued();
        self.run_feedback();
    }

    /// Add a mapping on the active page, the way interactive binding does:
    /// channel pinned to the given one, slider mode, incremental when the
    /// controller is configured that way.
    pub fn add_mapping(
        &mut self,
        kind: MessageKind,
        control: u8,
        channel: Option<u8>,
        target: BindingTarget,
    ) -> usize {
        let mut entry = MappingEntry::new(kind, control, channel, Some(self.pages.active()), target);
        if self.incremental_sliders {
            entry.increment = 1.0;
        }
        self.insert_entry(entry)
    }

    /// Push an entry, marking its target as remotely controlled when this is
    /// the first entry driving it.
    pub(crate) fn insert_entry(&mut self, entry: MappingEntry) -> usize {
        if let BindingTarget::Control(handle) = &entry.target {
            if !self.references(handle, None) {
                handle.add_remote_controller();
            }
        }
        debug!("Added mapping: {}", entry);
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Remove the mapping at `index`. The target loses its remote-controller
    /// mark when no other entry drives it.
    pub fn remove_mapping(&mut self, index: usize) -> bool {
        if index >= self.entries.len() {
            return false;
        }
        let entry = self.entries.remove(index);
        if let BindingTarget::Control(handle) = &entry.target {
            if !self.references(handle, None) {
                handle.remove_remote_controller();
            }
        }
        debug!("Removed mapping: {}", entry);
        true
    }

    /// Duplicate the mapping at `index` (the copy re-emits feedback on the
    /// next pass). Returns the new index.
    pub fn copy_mapping(&mut self, index: usize) -> Option<usize> {
        let mut copy = self.entries.get(index)?.clone();
        copy.force_resend();
        Some(self.insert_entry(copy))
    }

    /// Whether any entry other than `skip` drives `handle`.
    fn references(&self, handle: &ParamHandle, skip: Option<usize>) -> bool {
        self.entries.iter().enumerate().any(|(i, entry)| {
            skip.map_or(true, |s| i != s)
                && matches!(&entry.target, BindingTarget::Control(h) if Arc::ptr_eq(h, handle))
        })
    }

    /// Replace the mapping table with entries built from `config`.
    pub fn load_mappings(&mut self, config: &ControllerConfig) {
        self.clear_mappings();
        for mapping in &config.connections {
            for entry in mapping.build_entries(self.params.as_ref()) {
                self.insert_entry(entry);
            }
        }
        info!("Loaded {} mappings", self.entries.len());
    }

    /// Drop every mapping, releasing remote-controller marks.
    pub fn clear_mappings(&mut self) {
        while !self.entries.is_empty() {
            self.remove_mapping(self.entries.len() - 1);
        }
    }

    /// Persisted form of the current mapping table.
    pub fn export_mappings(&self) -> Vec<MappingConfig> {
        self.entries.iter().map(MappingConfig::from_entry).collect()
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut MappingEntry> {
        self.entries.get_mut(index)
    }

    pub fn set_two_way(&mut self, on: bool) {
        self.two_way = on;
    }

    pub fn set_negative_edge(&mut self, on: bool) {
        self.negative_edge = on;
    }

    pub fn set_incremental_sliders(&mut self, on: bool) {
        self.incremental_sliders = on;
    }

    /// Hold or release the fine-adjust modifier for relative sliders.
    pub fn set_fine_adjust(&mut self, held: bool) {
        self.fine_adjust = held;
    }

    pub fn connected(&self) -> bool {
        self.was_connected
    }

    pub fn active_page(&self) -> usize {
        self.pages.active()
    }

    /// Most recent input event, human readable. Empty before the first one.
    pub fn last_input(&self) -> &str {
        &self.last_input
    }

    /// Time of the most recent event and whether it matched a mapping.
    pub fn last_activity(&self) -> Option<(Instant, bool)> {
        self.last_activity
            .map(|when| (when, self.last_activity_bound))
    }

    /// Activity for one controller address, if it has ever sent.
    pub fn control_activity(&self, kind: MessageKind, control: u8) -> Option<ControlActivity> {
        self.activity.get(&(kind, control)).copied()
    }

    pub fn add_listener(&mut self, page: usize, listener: Arc<dyn MidiListener>) {
        self.pages.add_listener(page, listener);
    }

    pub fn remove_listener(&mut self, listener: &Arc<dyn MidiListener>) {
        self.pages.remove_listener(listener);
    }
}
