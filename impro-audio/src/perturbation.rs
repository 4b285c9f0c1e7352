//! Key-aware stochastic pitch adjustment for generated notes.

use rand::Rng;

use impro_types::{Key, PitchSet, MAX_PITCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSet {
    Arpeggio,
    Scale,
}

/// The random choices behind one adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerturbChoice {
    pub direction: Direction,
    pub candidates: CandidateSet,
    /// Candidate-set members to pass over before landing (0..=3)
    pub skip: u8,
}

impl PerturbChoice {
    /// Draw direction, candidate set and skip count.
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let d: f32 = rng.gen();
        let m: f32 = rng.gen();
        Self {
            direction: if d > 0.5 { Direction::Up } else { Direction::Down },
            candidates: if m < 0.5 { CandidateSet::Arpeggio } else { CandidateSet::Scale },
            skip: rng.gen_range(0..4),
        }
    }
}

/// Adjust `pitch` toward the key with probability `randomness`.
///
/// Without a key the pitch passes through and no random numbers are drawn.
pub fn adjust<R: Rng + ?Sized>(pitch: u8, key: Option<Key>, randomness: f32, rng: &mut R) -> u8 {
    let Some(key) = key else {
        return pitch;
    };
    let r: f32 = rng.gen();
    let choice = PerturbChoice::draw(rng);
    if r >= randomness {
        return pitch;
    }
    walk(pitch, key, choice)
}

/// Deterministic form of [`adjust`]: `roll` stands in for the draw compared
/// against `randomness`.
pub fn adjust_with(pitch: u8, key: Option<Key>, randomness: f32, roll: f32, choice: PerturbChoice) -> u8 {
    match key {
        Some(key) if roll < randomness => walk(pitch, key, choice),
        _ => pitch,
    }
}

/// Step one semitone at a time from `pitch` and land on the
/// `(skip + 1)`-th candidate-set member. Running off either end of the
/// MIDI range returns `pitch` unchanged.
fn walk(pitch: u8, key: Key, choice: PerturbChoice) -> u8 {
    let set: PitchSet = match choice.candidates {
        CandidateSet::Arpeggio => key.arpeggio_set(),
        CandidateSet::Scale => key.scale_set(),
    };
    let mut remaining = choice.skip;
    let mut current = pitch;
    loop {
        current = match choice.direction {
            Direction::Up if current < MAX_PITCH => current + 1,
            Direction::Down if current > 0 => current - 1,
            _ => return pitch,
        };
        if set.contains(current) {
            if remaining == 0 {
                return current;
            }
            remaining -= 1;
        }
    }
}
