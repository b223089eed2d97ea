//! MIDI input: message parsing, note mapping and port selection
//!
//! Only two message kinds matter to the controller: program changes select a
//! cue, note-ons on a handful of pads trigger transport actions. Everything
//! else is parsed to `InputEvent::Other` and ignored.

use colored::*;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, trace};

use crate::error::ShowError;

/// Client name shown to the MIDI subsystem
const CLIENT_NAME: &str = "ShowBox";

/// Name fragments of virtual/loopback ports, in order of preference
const PORT_HINTS: [&str; 4] = ["midi through", "virtual", "loopmidi", "iac"];

/// How often an open session checks that its port is still present
pub const PORT_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Typed input event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Program Change: channel (0-15), program (0-127, zero-based)
    ProgramChange { channel: u8, program: u8 },
    /// Note On with non-zero velocity
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Anything else (note-off, CC, clock, ...)
    Other,
}

impl InputEvent {
    /// Parse a MIDI message from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;

        // Running status is not used by the controllers we listen to
        if status < 0x80 {
            return None;
        }

        let channel = status & 0x0F;
        match status & 0xF0 {
            0x90 => {
                if data.len() < 3 {
                    return None;
                }
                let note = data[1] & 0x7F;
                let velocity = data[2] & 0x7F;

                // Note On with velocity 0 is a Note Off
                if velocity == 0 {
                    Some(InputEvent::Other)
                } else {
                    Some(InputEvent::NoteOn { channel, note, velocity })
                }
            }
            0xC0 => {
                if data.len() < 2 {
                    return None;
                }
                Some(InputEvent::ProgramChange {
                    channel,
                    program: data[1] & 0x7F,
                })
            }
            _ => Some(InputEvent::Other),
        }
    }
}

impl std::fmt::Display for InputEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            InputEvent::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
            InputEvent::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            InputEvent::Other => write!(f, "Other"),
        }
    }
}

/// Transport action bound to a pad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteAction {
    Go,
    Back,
    Fire,
    Stop,
}

impl NoteAction {
    /// Pad mapping: C1 go, C#1 back, D1 fire, D#1 stop
    pub fn from_note(note: u8) -> Option<Self> {
        match note {
            24 => Some(NoteAction::Go),
            25 => Some(NoteAction::Back),
            26 => Some(NoteAction::Fire),
            27 => Some(NoteAction::Stop),
            _ => None,
        }
    }
}

impl std::fmt::Display for NoteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoteAction::Go => write!(f, "go"),
            NoteAction::Back => write!(f, "back"),
            NoteAction::Fire => write!(f, "fire"),
            NoteAction::Stop => write!(f, "stop"),
        }
    }
}

/// Pick the input port to open.
///
/// Order: configured name (exact, then case-insensitive substring), then a
/// virtual-port hint, then the first port. A configured name that matches
/// nothing is an error rather than a silent fallback.
pub fn resolve_input_port(ports: &[String], configured: &str) -> Result<usize, ShowError> {
    if ports.is_empty() {
        return Err(ShowError::device("no MIDI input ports available", ports));
    }

    let wanted = configured.trim();
    if !wanted.is_empty() {
        let wanted_lower = wanted.to_lowercase();
        return ports
            .iter()
            .position(|p| p == wanted)
            .or_else(|| {
                ports
                    .iter()
                    .position(|p| p.to_lowercase().contains(&wanted_lower))
            })
            .ok_or_else(|| {
                ShowError::device(format!("configured midi_in_port not found: {}", wanted), ports)
            });
    }

    for hint in PORT_HINTS {
        if let Some(index) = ports.iter().position(|p| p.to_lowercase().contains(hint)) {
            debug!("Port '{}' matched hint '{}'", ports[index], hint);
            return Ok(index);
        }
    }

    Ok(0)
}

/// List available MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>, ShowError> {
    let midi_in = MidiInput::new(&format!("{}-Scanner", CLIENT_NAME))
        .map_err(|e| ShowError::device(format!("cannot initialise MIDI input: {}", e), &[]))?;

    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect())
}

/// List available MIDI output ports
pub fn list_output_ports() -> Result<Vec<String>, ShowError> {
    let midi_out = MidiOutput::new(&format!("{}-Scanner", CLIENT_NAME))
        .map_err(|e| ShowError::device(format!("cannot initialise MIDI output: {}", e), &[]))?;

    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect())
}

/// Whether an opened port still shows up in a fresh port listing
pub fn port_listed(ports: &[String], port_name: &str) -> bool {
    ports.iter().any(|p| p == port_name)
}

/// Print ports for `--list-ports`
pub fn print_ports() {
    println!("\n{}", "=== MIDI Ports ===".bold().cyan());

    for (title, ports) in [("Inputs", list_input_ports()), ("Outputs", list_output_ports())] {
        println!("\n{}", title.bold());
        match ports {
            Ok(ports) if ports.is_empty() => println!("  {}", "(none)".dimmed()),
            Ok(ports) => {
                for (index, name) in ports.iter().enumerate() {
                    println!("  [{}] {}", index.to_string().yellow(), name.green());
                }
            }
            Err(e) => println!("  {}", e.to_string().red()),
        }
    }
    println!();
}

/// Open MIDI input yielding typed events.
///
/// The midir callback thread parses bytes and forwards them over an unbounded
/// channel. midir never reports an unplugged device, so the listener also
/// re-lists ports periodically and fails once its port is gone.
pub struct MidiListener {
    _connection: MidiInputConnection<()>,
    events: UnboundedReceiverStream<InputEvent>,
    port_name: String,
    port_check: Interval,
}

impl MidiListener {
    /// Resolve and open an input port
    pub fn open(configured: &str, midi_debug: bool) -> Result<Self, ShowError> {
        let mut midi_in = MidiInput::new(&format!("{}-Input", CLIENT_NAME))
            .map_err(|e| ShowError::device(format!("cannot initialise MIDI input: {}", e), &[]))?;
        midi_in.ignore(Ignore::All);

        let ports = midi_in.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_in.port_name(p).unwrap_or_else(|_| "<unnamed>".to_string()))
            .collect();

        let index = resolve_input_port(&names, configured)?;
        let port_name = names[index].clone();

        let (tx, rx) = mpsc::unbounded_channel();
        let connection = midi_in
            .connect(
                &ports[index],
                CLIENT_NAME,
                move |_timestamp, data, _| {
                    if midi_debug {
                        info!("RX: {:02X?}", data);
                    } else {
                        trace!("RX: {:02X?}", data);
                    }
                    if let Some(event) = InputEvent::parse(data) {
                        // Receiver gone means the session is shutting down
                        let _ = tx.send(event);
                    }
                },
                (),
            )
            .map_err(|e| ShowError::device(format!("cannot open '{}': {}", port_name, e), &names))?;

        info!("Listening on MIDI input: {}", port_name);

        let mut port_check = interval_at(Instant::now() + PORT_CHECK_INTERVAL, PORT_CHECK_INTERVAL);
        port_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            _connection: connection,
            events: UnboundedReceiverStream::new(rx),
            port_name,
            port_check,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Wait for the next event.
    ///
    /// `Ok(None)` means the callback side closed; a `Device` error means the
    /// port disappeared from the system.
    pub async fn next_event(&mut self) -> Result<Option<InputEvent>, ShowError> {
        loop {
            tokio::select! {
                event = self.events.next() => return Ok(event),
                _ = self.port_check.tick() => {
                    let ports = list_input_ports()?;
                    if !port_listed(&ports, &self.port_name) {
                        return Err(ShowError::device(
                            format!("MIDI input '{}' disconnected", self.port_name),
                            &ports,
                        ));
                    }
                }
            }
        }
    }
}
