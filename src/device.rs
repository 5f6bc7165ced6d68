//! MIDI hardware I/O.
//!
//! Port discovery and connection via midir. Ports are matched by
//! case-insensitive substring so platform-decorated names ("X-Touch 0",
//! "X-Touch MIDI 1") still resolve. Output is abstracted behind
//! [`MidiSendPort`] so the engine can run against a [`NullPort`] when no
//! hardware is attached.

use std::sync::Arc;

use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::input::InputDispatcher;
use crate::midi::{format_hex, wire_channel, MidiEvent};

/// Errors from port discovery and connection.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("MIDI backend init failed: {0}")]
    Init(#[from] midir::InitError),

    #[error("no MIDI input port matching '{0}'")]
    InputPortNotFound(String),

    #[error("no MIDI output port matching '{0}'")]
    OutputPortNotFound(String),

    #[error("failed to open port '{name}': {detail}")]
    Connect { name: String, detail: String },
}

/// List available MIDI input port names.
pub fn list_input_ports() -> Result<Vec<String>, DeviceError> {
    let midi_in = MidiInput::new("midimap-scan")?;
    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect())
}

/// List available MIDI output port names.
pub fn list_output_ports() -> Result<Vec<String>, DeviceError> {
    let midi_out = MidiOutput::new("midimap-scan")?;
    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect())
}

fn find_input_port(midi_in: &MidiInput, pattern: &str) -> Option<(midir::MidiInputPort, String)> {
    for port in midi_in.ports() {
        if let Ok(name) = midi_in.port_name(&port) {
            if name.to_lowercase().contains(&pattern.to_lowercase()) {
                return Some((port, name));
            }
        }
    }
    None
}

fn find_output_port(
    midi_out: &MidiOutput,
    pattern: &str,
) -> Option<(midir::MidiOutputPort, String)> {
    for port in midi_out.ports() {
        if let Ok(name) = midi_out.port_name(&port) {
            if name.to_lowercase().contains(&pattern.to_lowercase()) {
                return Some((port, name));
            }
        }
    }
    None
}

/// An open input port feeding parsed events into an [`InputDispatcher`].
///
/// Keeps the resolved pattern and dispatcher around so the connection can be
/// re-established after the controller is unplugged and plugged back in.
pub struct InputConnection {
    pattern: String,
    name: String,
    dispatcher: Arc<InputDispatcher>,
    conn: Option<MidiInputConnection<()>>,
}

impl InputConnection {
    /// Open the input port matching `pattern`. The port stays open until the
    /// returned value is dropped.
    pub fn open(pattern: &str, dispatcher: Arc<InputDispatcher>) -> Result<Self, DeviceError> {
        let (conn, name) = Self::connect(pattern, dispatcher.clone())?;
        Ok(Self {
            pattern: pattern.to_string(),
            name,
            dispatcher,
            conn: Some(conn),
        })
    }

    fn connect(
        pattern: &str,
        dispatcher: Arc<InputDispatcher>,
    ) -> Result<(MidiInputConnection<()>, String), DeviceError> {
        let midi_in = MidiInput::new("midimap-in")?;
        let (port, name) = find_input_port(&midi_in, pattern)
            .ok_or_else(|| DeviceError::InputPortNotFound(pattern.to_string()))?;

        info!("Connecting to input port: {}", name);
        let conn = midi_in
            .connect(
                &port,
                "midimap",
                move |_timestamp, data, _| match MidiEvent::parse(data) {
                    Some(event) => dispatcher.on_event(event),
                    None => trace!("unhandled midi in: {}", format_hex(data)),
                },
                (),
            )
            .map_err(|e| DeviceError::Connect {
                name: name.clone(),
                detail: e.to_string(),
            })?;

        Ok((conn, name))
    }

    /// Drop the stale connection and try to open the port again.
    pub fn reconnect(&mut self) -> bool {
        self.conn = None;
        match Self::connect(&self.pattern, self.dispatcher.clone()) {
            Ok((conn, name)) => {
                self.conn = Some(conn);
                self.name = name;
                true
            }
            Err(e) => {
                debug!("input reconnect failed: {}", e);
                false
            }
        }
    }

    /// Resolved name of the connected port.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outbound feedback port.
///
/// Velocity and CC values are `i32` because some feedback modes forward raw
/// parameter values; whatever exceeds 7 bits is masked at the wire while the
/// caller caches the unmasked value.
pub trait MidiSendPort: Send {
    /// Send a note. `force_on` emits Note On even at velocity 0, which is
    /// what button LEDs listen for.
    fn send_note(&mut self, pitch: u8, velocity: i32, force_on: bool, channel: Option<u8>);

    /// Send a control change. `channel: None` uses the port's configured
    /// output channel.
    fn send_cc(&mut self, control: u8, value: i32, channel: Option<u8>);

    fn is_connected(&self) -> bool;

    /// Try to re-open the port after an unplug. True when sending works again.
    fn reconnect(&mut self) -> bool;

    fn port_name(&self) -> &str;
}

/// A midir-backed output port.
pub struct MidirSendPort {
    pattern: String,
    name: String,
    out_channel: u8,
    conn: Option<MidiOutputConnection>,
}

impl MidirSendPort {
    /// Open the output port matching `pattern`. `out_channel` (1-16) is used
    /// when a send does not pin a channel.
    pub fn connect(pattern: &str, out_channel: u8) -> Result<Self, DeviceError> {
        let midi_out = MidiOutput::new("midimap-out")?;
        let (port, name) = find_output_port(&midi_out, pattern)
            .ok_or_else(|| DeviceError::OutputPortNotFound(pattern.to_string()))?;

        info!("Connecting to output port: {}", name);
        let conn = midi_out
            .connect(&port, "midimap")
            .map_err(|e| DeviceError::Connect {
                name: name.clone(),
                detail: e.to_string(),
            })?;

        Ok(Self {
            pattern: pattern.to_string(),
            name,
            out_channel: out_channel.clamp(1, 16),
            conn: Some(conn),
        })
    }

    fn send(&mut self, bytes: [u8; 3]) {
        if let Some(conn) = self.conn.as_mut() {
            if let Err(e) = conn.send(&bytes) {
                warn!("midi send failed on '{}': {}", self.name, e);
                self.conn = None;
                return;
            }
            trace!("midi out: {}", format_hex(&bytes));
        }
    }
}

impl MidiSendPort for MidirSendPort {
    fn send_note(&mut self, pitch: u8, velocity: i32, force_on: bool, channel: Option<u8>) {
        let channel = channel.unwrap_or(self.out_channel);
        let status: u8 = if velocity > 0 || force_on { 0x90 } else { 0x80 };
        self.send([
            status | wire_channel(channel),
            pitch & 0x7F,
            (velocity & 0x7F) as u8,
        ]);
    }

    fn send_cc(&mut self, control: u8, value: i32, channel: Option<u8>) {
        let channel = channel.unwrap_or(self.out_channel);
        self.send([
            0xB0 | wire_channel(channel),
            control & 0x7F,
            (value & 0x7F) as u8,
        ]);
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some() && output_port_present(&self.name)
    }

    fn reconnect(&mut self) -> bool {
        match Self::connect(&self.pattern, self.out_channel) {
            Ok(port) => {
                info!("Reconnected to output port: {}", port.name);
                *self = port;
                true
            }
            Err(e) => {
                debug!("output reconnect failed: {}", e);
                false
            }
        }
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

/// True when an output port whose name contains `name` is currently present.
fn output_port_present(name: &str) -> bool {
    match MidiOutput::new("midimap-scan") {
        Ok(midi_out) => find_output_port(&midi_out, name).is_some(),
        Err(_) => false,
    }
}

/// Stand-in when no output hardware is configured. Swallows all sends.
pub struct NullPort;

impl MidiSendPort for NullPort {
    fn send_note(&mut self, pitch: u8, velocity: i32, _force_on: bool, _channel: Option<u8>) {
        trace!("midi out (no port): note {} v:{}", pitch, velocity);
    }

    fn send_cc(&mut self, control: u8, value: i32, _channel: Option<u8>) {
        trace!("midi out (no port): cc {} v:{}", control, value);
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn reconnect(&mut self) -> bool {
        false
    }

    fn port_name(&self) -> &str {
        "(none)"
    }
}
