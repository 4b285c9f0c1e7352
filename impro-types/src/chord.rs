//! Chord aggregation: clusters near-simultaneous note-ons into one chord.
//!
//! A cluster starts at its first note. Any note arriving within `window`
//! samples of that start joins the cluster; the first note arriving later
//! closes it (the closed cluster becomes the completed chord) and opens a
//! new cluster. A chord is therefore reported one note "late", when the
//! next cluster begins.

/// Typical upper bound on simultaneous notes; buffers grow past it if needed.
const CLUSTER_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct ChordAggregator {
    /// Clustering window in samples
    window: u64,
    /// Pitches of the cluster being built (sorted, unique)
    cluster: Vec<u8>,
    /// Timestamp of the first note of the current cluster
    cluster_start: Option<u64>,
    /// Last closed cluster
    completed: Vec<u8>,
    has_chord: bool,
}

impl ChordAggregator {
    pub fn new(window: u64) -> Self {
        Self {
            window,
            cluster: Vec::with_capacity(CLUSTER_CAPACITY),
            cluster_start: None,
            completed: Vec::with_capacity(CLUSTER_CAPACITY),
            has_chord: false,
        }
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Change the clustering window. Intended for stream start only.
    pub fn set_window(&mut self, window: u64) {
        self.window = window;
    }

    /// Ingest one note-on at an absolute sample time.
    pub fn add_note(&mut self, pitch: u8, timestamp: u64) {
        match self.cluster_start {
            Some(start) if timestamp.saturating_sub(start) > self.window => {
                self.completed.clear();
                self.completed.extend_from_slice(&self.cluster);
                self.has_chord = !self.completed.is_empty();
                self.cluster.clear();
                self.cluster_start = Some(timestamp);
            }
            Some(_) => {}
            None => self.cluster_start = Some(timestamp),
        }
        if let Err(pos) = self.cluster.binary_search(&pitch) {
            self.cluster.insert(pos, pitch);
        }
    }

    pub fn has_chord(&self) -> bool {
        self.has_chord
    }

    /// Hand out the completed chord, if any, and clear the flag.
    ///
    /// The returned slice stays valid until the next `add_note`.
    pub fn take_chord(&mut self) -> Option<&[u8]> {
        if !self.has_chord {
            return None;
        }
        self.has_chord = false;
        Some(&self.completed)
    }

    /// Drop any partial cluster and pending chord.
    pub fn reset(&mut self) {
        self.cluster.clear();
        self.completed.clear();
        self.cluster_start = None;
        self.has_chord = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = 2400; // 50ms at 48kHz

    #[test]
    fn single_note_does_not_complete() {
        let mut agg = ChordAggregator::new(WINDOW);
        agg.add_note(60, 0);
        assert!(!agg.has_chord());
        assert_eq!(agg.take_chord(), None);
    }

    #[test]
    fn cluster_closes_on_late_note() {
        let mut agg = ChordAggregator::new(WINDOW);
        agg.add_note(67, 0);
        agg.add_note(60, 100);
        agg.add_note(64, 2000);
        assert!(!agg.has_chord());

        agg.add_note(72, 10_000);
        assert!(agg.has_chord());
        assert_eq!(agg.take_chord(), Some(&[60u8, 64, 67][..]));
        assert!(!agg.has_chord());
    }

    #[test]
    fn window_is_measured_from_cluster_start() {
        let mut agg = ChordAggregator::new(WINDOW);
        agg.add_note(60, 0);
        agg.add_note(62, 2000);
        // 2500 - 0 > window even though 2500 - 2000 is not
        agg.add_note(64, 2500);
        assert_eq!(agg.take_chord(), Some(&[60u8, 62][..]));
    }

    #[test]
    fn duplicates_collapse() {
        let mut agg = ChordAggregator::new(WINDOW);
        agg.add_note(60, 0);
        agg.add_note(60, 10);
        agg.add_note(48, 5000);
        assert_eq!(agg.take_chord(), Some(&[60u8][..]));
    }

    #[test]
    fn consecutive_single_notes_form_single_note_chords() {
        let mut agg = ChordAggregator::new(WINDOW);
        let mut chords = Vec::new();
        for (i, pitch) in [60u8, 62, 64, 65].iter().enumerate() {
            agg.add_note(*pitch, i as u64 * 10_000);
            if let Some(chord) = agg.take_chord() {
                chords.push(chord.to_vec());
            }
        }
        assert_eq!(chords, vec![vec![60], vec![62], vec![64]]);
    }

    #[test]
    fn reset_clears_pending_cluster() {
        let mut agg = ChordAggregator::new(WINDOW);
        agg.add_note(60, 0);
        agg.reset();
        agg.add_note(64, 10_000);
        assert!(!agg.has_chord());
    }
}
