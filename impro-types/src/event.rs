/// Highest MIDI velocity.
pub const MAX_VELOCITY: u8 = 127;

/// Note event kinds the engine learns from and emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEventKind {
    NoteOn { velocity: u8 },
    NoteOff,
}

/// A note event inside one processing block.
///
/// `offset` is the sample position within the block. Generated events are
/// always emitted at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub kind: NoteEventKind,
    pub pitch: u8,
    pub offset: u32,
}

impl NoteEvent {
    pub fn note_on(pitch: u8, velocity: u8, offset: u32) -> Self {
        Self {
            kind: NoteEventKind::NoteOn { velocity },
            pitch,
            offset,
        }
    }

    pub fn note_off(pitch: u8, offset: u32) -> Self {
        Self {
            kind: NoteEventKind::NoteOff,
            pitch,
            offset,
        }
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self.kind, NoteEventKind::NoteOn { .. })
    }

    pub fn velocity(&self) -> Option<u8> {
        match self.kind {
            NoteEventKind::NoteOn { velocity } => Some(velocity),
            NoteEventKind::NoteOff => None,
        }
    }
}

impl Default for NoteEvent {
    fn default() -> Self {
        Self::note_off(0, 0)
    }
}
