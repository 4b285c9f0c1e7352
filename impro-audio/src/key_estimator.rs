//! Running key inference by scale-membership voting.
//!
//! Every observed pitch votes for each of the 24 keys: one point if it is in
//! the key's scale, one if it is in the key's arpeggio, one if it is the
//! key's root pitch class. The current key is the highest score, lowest index
//! on ties; an all-zero table has no key.

use impro_types::{Key, PitchClass, KEY_COUNT};

/// Leader transition reported by the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyChange {
    pub key: Option<Key>,
}

impl KeyChange {
    /// Display name, empty when there is no key.
    pub fn name(&self) -> &'static str {
        self.key.map(Key::name).unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct KeyEstimator {
    scores: [u32; KEY_COUNT],
    current: Option<Key>,
    /// Scores were replaced wholesale; the leader must be recomputed
    stale: bool,
    decay_ceiling: Option<u32>,
}

impl KeyEstimator {
    pub fn new(decay_ceiling: Option<u32>) -> Self {
        Self {
            scores: [0; KEY_COUNT],
            current: None,
            stale: false,
            decay_ceiling,
        }
    }

    pub fn current(&self) -> Option<Key> {
        self.current
    }

    pub fn scores(&self) -> &[u32; KEY_COUNT] {
        &self.scores
    }

    /// Score one pitch. Returns the new leader if it changed.
    pub fn observe(&mut self, pitch: u8) -> Option<KeyChange> {
        let class = PitchClass::of(pitch);
        for key in Key::all() {
            let votes = key.scale_set().contains(pitch) as u32
                + key.arpeggio_set().contains(pitch) as u32
                + (key.root == class) as u32;
            let slot = &mut self.scores[key.index()];
            *slot = slot.saturating_add(votes);
        }
        self.apply_decay();
        self.refresh()
    }

    /// Recompute the leader from the stored scores without scoring a pitch.
    pub fn refresh(&mut self) -> Option<KeyChange> {
        self.stale = false;
        let leader = self.leader();
        if leader == self.current {
            return None;
        }
        self.current = leader;
        Some(KeyChange { key: leader })
    }

    /// Zero all scores. Reports a change if there was a key.
    pub fn reset(&mut self) -> Option<KeyChange> {
        self.scores = [0; KEY_COUNT];
        self.stale = false;
        self.current.take().map(|_| KeyChange { key: None })
    }

    /// Replace all scores. The leader is not recomputed until `refresh`.
    pub fn set_scores(&mut self, scores: [u32; KEY_COUNT]) {
        self.scores = scores;
        self.stale = true;
    }

    /// Overwrite only the slots that carry a value.
    pub fn merge_scores(&mut self, scores: &[Option<u32>; KEY_COUNT]) {
        for (slot, value) in self.scores.iter_mut().zip(scores) {
            if let Some(value) = value {
                *slot = *value;
            }
        }
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    fn leader(&self) -> Option<Key> {
        let mut best: Option<usize> = None;
        let mut best_score = 0;
        for (index, &score) in self.scores.iter().enumerate() {
            if score > best_score {
                best_score = score;
                best = Some(index);
            }
        }
        best.and_then(Key::from_index)
    }

    fn apply_decay(&mut self) {
        let Some(ceiling) = self.decay_ceiling else {
            return;
        };
        let top = self.scores.iter().copied().max().unwrap_or(0);
        if top > ceiling {
            log::debug!(target: "engine", "key scores passed {}, halving", ceiling);
            for score in self.scores.iter_mut() {
                *score /= 2;
            }
        }
    }
}

impl Default for KeyEstimator {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use impro_types::{Mode, MAX_PITCH};

    fn key(root: PitchClass, mode: Mode) -> Key {
        Key::new(root, mode)
    }

    #[test]
    fn starts_without_key() {
        let estimator = KeyEstimator::default();
        assert_eq!(estimator.current(), None);
        assert!(estimator.scores().iter().all(|&s| s == 0));
    }

    #[test]
    fn each_score_rises_by_at_most_three() {
        let mut estimator = KeyEstimator::default();
        for pitch in 0..=MAX_PITCH {
            let before = *estimator.scores();
            estimator.observe(pitch);
            for (after, before) in estimator.scores().iter().zip(before.iter()) {
                assert!(after - before <= 3, "pitch {}", pitch);
            }
            // the pitch's own major and minor keys gain at least the root point
            let raised = estimator.scores().iter().zip(before.iter()).filter(|(a, b)| a > b).count();
            assert!(raised >= 2, "pitch {}", pitch);
        }
    }

    #[test]
    fn middle_c_scores() {
        let mut estimator = KeyEstimator::default();
        estimator.observe(60);
        let scores = estimator.scores();
        // C major: scale + arpeggio + root
        assert_eq!(scores[key(PitchClass::C, Mode::Major).index()], 3);
        // F major: scale + arpeggio (fifth)
        assert_eq!(scores[key(PitchClass::F, Mode::Major).index()], 2);
        // D major: C natural is not in the scale
        assert_eq!(scores[key(PitchClass::D, Mode::Major).index()], 0);
        // A minor: scale + arpeggio (third)
        assert_eq!(scores[key(PitchClass::A, Mode::Minor).index()], 2);
    }

    #[test]
    fn first_observation_reports_change() {
        let mut estimator = KeyEstimator::default();
        let change = estimator.observe(60);
        assert_eq!(change, Some(KeyChange { key: Some(key(PitchClass::C, Mode::Major)) }));
        assert_eq!(change.map(|c| c.name()), Some("C Major"));
        // same leader, no notification
        assert_eq!(estimator.observe(64), None);
    }

    #[test]
    fn ties_go_to_lowest_index() {
        let mut estimator = KeyEstimator::default();
        let mut scores = [0; KEY_COUNT];
        scores[5] = 9;
        scores[2] = 9;
        scores[20] = 9;
        estimator.set_scores(scores);
        assert!(estimator.is_stale());
        let change = estimator.refresh();
        assert_eq!(change.and_then(|c| c.key).map(Key::index), Some(2));
        assert!(!estimator.is_stale());
    }

    #[test]
    fn leader_only_replaced_on_strictly_greater() {
        let mut estimator = KeyEstimator::default();
        let mut scores = [0; KEY_COUNT];
        scores[0] = 4;
        estimator.set_scores(scores);
        estimator.refresh();
        scores[12] = 4;
        estimator.set_scores(scores);
        assert_eq!(estimator.refresh(), None);
        assert_eq!(estimator.current().map(Key::index), Some(0));
    }

    #[test]
    fn reset_clears_key_and_reports() {
        let mut estimator = KeyEstimator::default();
        estimator.observe(62);
        assert_eq!(estimator.reset(), Some(KeyChange { key: None }));
        assert_eq!(estimator.current(), None);
        assert_eq!(estimator.reset(), None);
    }

    #[test]
    fn merge_keeps_missing_slots() {
        let mut estimator = KeyEstimator::default();
        estimator.set_scores([1; KEY_COUNT]);
        let mut update = [None; KEY_COUNT];
        update[3] = Some(10);
        estimator.merge_scores(&update);
        assert_eq!(estimator.scores()[3], 10);
        assert_eq!(estimator.scores()[4], 1);
        assert_eq!(estimator.refresh().and_then(|c| c.key).map(Key::index), Some(3));
    }

    #[test]
    fn decay_halves_scores_past_ceiling() {
        let mut estimator = KeyEstimator::new(Some(5));
        estimator.observe(60);
        estimator.observe(60);
        // C major reached 6 > 5 and was halved
        assert_eq!(estimator.scores()[0], 3);
        assert_eq!(estimator.current().map(Key::index), Some(0));
    }

    #[test]
    fn no_decay_by_default() {
        let mut estimator = KeyEstimator::default();
        for _ in 0..100 {
            estimator.observe(60);
        }
        assert_eq!(estimator.scores()[0], 300);
    }
}
