//! Sample clock, play gate and pending note-offs.

use impro_types::{NoteEvent, MAX_PITCH};

const PITCHES: usize = MAX_PITCH as usize + 1;

#[derive(Debug, Clone)]
pub struct Scheduler {
    /// Samples since stream start
    clock: u64,
    /// Earliest clock at which the next generation step may run.
    /// `None` until the first step has booked one.
    next_play_deadline: Option<u64>,
    /// At most one pending note-off per pitch
    pending_offs: [Option<u64>; PITCHES],
    /// Set once the pitch model has produced a chord
    bootstrapped: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            clock: 0,
            next_play_deadline: None,
            pending_offs: [None; PITCHES],
            bootstrapped: false,
        }
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn advance(&mut self, block_len: u64) {
        self.clock = self.clock.saturating_add(block_len);
    }

    pub fn bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    pub fn set_bootstrapped(&mut self, bootstrapped: bool) {
        self.bootstrapped = bootstrapped;
    }

    pub fn next_play_deadline(&self) -> Option<u64> {
        self.next_play_deadline
    }

    /// True when a generation step may run this tick.
    pub fn gate_open(&self) -> bool {
        self.bootstrapped && self.next_play_deadline.map_or(true, |deadline| self.clock >= deadline)
    }

    /// Book the next gate opening `ioi` samples from now.
    pub fn set_next_deadline(&mut self, ioi: u64) {
        self.next_play_deadline = Some(self.clock.saturating_add(ioi));
    }

    /// Book a note-off `duration` samples from now, replacing any pending
    /// one for the same pitch.
    pub fn book_note_off(&mut self, pitch: u8, duration: u64) {
        if let Some(slot) = self.pending_offs.get_mut(pitch as usize) {
            *slot = Some(self.clock.saturating_add(duration));
        }
    }

    pub fn pending_off(&self, pitch: u8) -> Option<u64> {
        self.pending_offs.get(pitch as usize).copied().flatten()
    }

    pub fn pending_count(&self) -> usize {
        self.pending_offs.iter().filter(|slot| slot.is_some()).count()
    }

    /// Emit a note-off at offset 0 for every deadline that has passed.
    pub fn flush_due(&mut self, out: &mut Vec<NoteEvent>) {
        let clock = self.clock;
        for (pitch, slot) in self.pending_offs.iter_mut().enumerate() {
            if matches!(slot, Some(deadline) if *deadline <= clock) {
                *slot = None;
                out.push(NoteEvent::note_off(pitch as u8, 0));
            }
        }
    }

    /// Emit a note-off for every pending pitch regardless of deadline.
    pub fn release_all(&mut self, out: &mut Vec<NoteEvent>) {
        for (pitch, slot) in self.pending_offs.iter_mut().enumerate() {
            if slot.take().is_some() {
                out.push(NoteEvent::note_off(pitch as u8, 0));
            }
        }
    }

    /// Forget the model-dependent state. The clock and pending note-offs
    /// survive so sounding notes are still released.
    pub fn reset(&mut self) {
        self.bootstrapped = false;
        self.next_play_deadline = None;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
