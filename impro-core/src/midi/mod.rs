use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use impro_types::{NoteEvent, NoteEventKind};

const CLIENT_NAME: &str = "impro";
const INPUT_QUEUE: usize = 1024;
const ALL_NOTES_OFF: u8 = 123;

/// A MIDI message stamped with its arrival time.
#[derive(Debug, Clone, Copy)]
pub struct MidiEvent {
    pub received: Instant,
    pub kind: MidiEventKind,
}

/// Note messages; everything else is dropped at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEventKind {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
}

impl MidiEvent {
    pub fn new(received: Instant, kind: MidiEventKind) -> Self {
        Self { received, kind }
    }

    /// Engine note event at `offset` within a block.
    pub fn to_note_event(&self, offset: u32) -> NoteEvent {
        match self.kind {
            MidiEventKind::NoteOn { note, velocity, .. } => NoteEvent::note_on(note, velocity, offset),
            MidiEventKind::NoteOff { note, .. } => NoteEvent::note_off(note, offset),
        }
    }
}

/// Information about an available MIDI port
#[derive(Debug, Clone)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

pub fn list_input_ports() -> Vec<MidiPortInfo> {
    let Ok(midi_in) = MidiInput::new(CLIENT_NAME) else {
        return Vec::new();
    };
    midi_in
        .ports()
        .iter()
        .enumerate()
        .filter_map(|(index, port)| midi_in.port_name(port).ok().map(|name| MidiPortInfo { index, name }))
        .collect()
}

pub fn list_output_ports() -> Vec<MidiPortInfo> {
    let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) else {
        return Vec::new();
    };
    midi_out
        .ports()
        .iter()
        .enumerate()
        .filter_map(|(index, port)| midi_out.port_name(port).ok().map(|name| MidiPortInfo { index, name }))
        .collect()
}

/// MIDI input manager. Incoming messages are parsed on the driver thread
/// and queued for the processing thread.
pub struct MidiInputManager {
    connection: Option<MidiInputConnection<()>>,
    event_sender: Sender<MidiEvent>,
    event_receiver: Receiver<MidiEvent>,
    connected_port_name: Option<String>,
}

impl MidiInputManager {
    pub fn new() -> Self {
        let (event_sender, event_receiver) = bounded(INPUT_QUEUE);
        Self {
            connection: None,
            event_sender,
            event_receiver,
            connected_port_name: None,
        }
    }

    /// Queue the processing thread reads from. Stays valid across reconnects.
    pub fn receiver(&self) -> Receiver<MidiEvent> {
        self.event_receiver.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connected_port_name(&self) -> Option<&str> {
        self.connected_port_name.as_deref()
    }

    /// Connect to a MIDI input port by index
    pub fn connect(&mut self, port_index: usize) -> Result<(), String> {
        self.disconnect();

        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| e.to_string())?;
        let ports = midi_in.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| format!("Invalid input port index: {}", port_index))?;
        let port_name = midi_in.port_name(port).unwrap_or_else(|_| "Unknown".to_string());

        let tx = self.event_sender.clone();
        let connection = midi_in
            .connect(
                port,
                "impro-input",
                move |_timestamp, message, _| {
                    if let Some(kind) = parse_midi_message(message) {
                        if tx.try_send(MidiEvent::new(Instant::now(), kind)).is_err() {
                            log::warn!(target: "midi", "input queue full, dropping event");
                        }
                    }
                },
                (),
            )
            .map_err(|e| e.to_string())?;

        log::info!(target: "midi", "input connected to {}", port_name);
        self.connection = Some(connection);
        self.connected_port_name = Some(port_name);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.connected_port_name = None;
    }
}

impl Default for MidiInputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MidiInputManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Destination for generated notes.
pub trait NoteSink: Send {
    fn send(&mut self, events: &[NoteEvent]);

    /// Silence everything, e.g. on shutdown.
    fn all_notes_off(&mut self) {}
}

/// MIDI output on a single channel.
pub struct MidiOutputManager {
    connection: MidiOutputConnection,
    /// 0-based channel
    channel: u8,
    port_name: String,
}

impl MidiOutputManager {
    /// Connect to output port `port_index`, sending on `channel` (1-16).
    pub fn connect(port_index: usize, channel: u8) -> Result<Self, String> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| e.to_string())?;
        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| format!("Invalid output port index: {}", port_index))?;
        let port_name = midi_out.port_name(port).unwrap_or_else(|_| "Unknown".to_string());
        let connection = midi_out
            .connect(port, "impro-output")
            .map_err(|e| e.to_string())?;
        log::info!(target: "midi", "output connected to {} on channel {}", port_name, channel);
        Ok(Self {
            connection,
            channel: channel.clamp(1, 16) - 1,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl NoteSink for MidiOutputManager {
    fn send(&mut self, events: &[NoteEvent]) {
        for event in events {
            if let Err(e) = self.connection.send(&encode_note_event(event, self.channel)) {
                log::warn!(target: "midi", "send failed: {}", e);
            }
        }
    }

    fn all_notes_off(&mut self) {
        let status = 0xB0 | self.channel;
        if let Err(e) = self.connection.send(&[status, ALL_NOTES_OFF, 0]) {
            log::warn!(target: "midi", "all-notes-off failed: {}", e);
        }
    }
}

/// Raw bytes for a note event on a 0-based channel.
pub fn encode_note_event(event: &NoteEvent, channel: u8) -> [u8; 3] {
    let channel = channel & 0x0F;
    let pitch = event.pitch & 0x7F;
    match event.kind {
        NoteEventKind::NoteOn { velocity } => [0x90 | channel, pitch, velocity & 0x7F],
        NoteEventKind::NoteOff => [0x80 | channel, pitch, 0],
    }
}

/// Parse a raw MIDI message. Only note-on and note-off are kept.
pub fn parse_midi_message(data: &[u8]) -> Option<MidiEventKind> {
    let (&status, data) = data.split_first()?;
    let channel = status & 0x0F;

    match (status & 0xF0, data) {
        (0x80, [note, _, ..]) => Some(MidiEventKind::NoteOff { channel, note: *note }),
        // Note On with velocity 0 is a Note Off
        (0x90, [note, 0, ..]) => Some(MidiEventKind::NoteOff { channel, note: *note }),
        (0x90, [note, velocity, ..]) => Some(MidiEventKind::NoteOn {
            channel,
            note: *note,
            velocity: *velocity,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_on() {
        let event = parse_midi_message(&[0x91, 60, 100]).unwrap();
        assert_eq!(
            event,
            MidiEventKind::NoteOn {
                channel: 1,
                note: 60,
                velocity: 100
            }
        );
    }

    #[test]
    fn test_parse_note_off() {
        let event = parse_midi_message(&[0x80, 60, 64]).unwrap();
        assert_eq!(event, MidiEventKind::NoteOff { channel: 0, note: 60 });
    }

    #[test]
    fn test_parse_note_on_velocity_zero() {
        let event = parse_midi_message(&[0x90, 60, 0]).unwrap();
        assert!(matches!(event, MidiEventKind::NoteOff { .. }));
    }

    #[test]
    fn test_parse_ignores_short_and_unknown() {
        assert_eq!(parse_midi_message(&[]), None);
        assert_eq!(parse_midi_message(&[0x90, 60]), None);
        assert_eq!(parse_midi_message(&[0xE0, 0, 64]), None);
        assert_eq!(parse_midi_message(&[0xF8]), None);
        // control change and program change are not note messages
        assert_eq!(parse_midi_message(&[0xB0, 1, 64]), None);
        assert_eq!(parse_midi_message(&[0xC0, 5]), None);
    }

    #[test]
    fn test_to_note_event() {
        let now = Instant::now();
        let on = MidiEvent::new(now, MidiEventKind::NoteOn { channel: 3, note: 64, velocity: 90 });
        assert_eq!(on.to_note_event(12), NoteEvent::note_on(64, 90, 12));
        let off = MidiEvent::new(now, MidiEventKind::NoteOff { channel: 3, note: 64 });
        assert_eq!(off.to_note_event(0), NoteEvent::note_off(64, 0));
    }

    #[test]
    fn test_encode_note_event() {
        assert_eq!(encode_note_event(&NoteEvent::note_on(60, 100, 0), 0), [0x90, 60, 100]);
        assert_eq!(encode_note_event(&NoteEvent::note_off(60, 0), 9), [0x89, 60, 0]);
    }
}
