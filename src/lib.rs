//! midimap - MIDI control-mapping engine.
//!
//! Binds physical controller input (notes, CC, program change, pitch bend)
//! to addressable host parameters, with two-way feedback driving LEDs and
//! motor faders. The host registers parameters behind [`param::ParamControl`],
//! feeds raw MIDI into [`input::InputDispatcher`] from its device thread, and
//! calls [`mapper::MidiMapper::tick`] from its periodic update loop; the
//! engine does the rest: matching, behavior modes, pages, bind capture,
//! feedback diffing, and JSON persistence of the mapping table.

pub mod clock;
pub mod config;
pub mod device;
pub mod input;
pub mod mapper;
pub mod mapping;
pub mod midi;
pub mod modulation;
pub mod pages;
pub mod param;
pub mod paths;
pub mod queue;

pub use config::ControllerConfig;
pub use input::InputDispatcher;
pub use mapper::MidiMapper;
pub use mapping::{BehaviorMode, MappingEntry, MessageKind};
pub use param::{BindingTarget, ParamControl, ParamHandle, ParamProvider};
