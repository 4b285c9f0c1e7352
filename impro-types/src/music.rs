/// Highest valid MIDI pitch.
pub const MAX_PITCH: u8 = 127;

/// Number of key candidates (12 major + 12 minor).
pub const KEY_COUNT: usize = 24;

/// Pitch class (C through B)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PitchClass {
    C,
    Cs,
    D,
    Ds,
    E,
    F,
    Fs,
    G,
    Gs,
    A,
    As,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::Cs,
        PitchClass::D,
        PitchClass::Ds,
        PitchClass::E,
        PitchClass::F,
        PitchClass::Fs,
        PitchClass::G,
        PitchClass::Gs,
        PitchClass::A,
        PitchClass::As,
        PitchClass::B,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::Cs => "C#",
            PitchClass::D => "D",
            PitchClass::Ds => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::Fs => "F#",
            PitchClass::G => "G",
            PitchClass::Gs => "G#",
            PitchClass::A => "A",
            PitchClass::As => "A#",
            PitchClass::B => "B",
        }
    }

    /// Semitone offset above C (0-11)
    pub const fn semitone(self) -> u8 {
        match self {
            PitchClass::C => 0,
            PitchClass::Cs => 1,
            PitchClass::D => 2,
            PitchClass::Ds => 3,
            PitchClass::E => 4,
            PitchClass::F => 5,
            PitchClass::Fs => 6,
            PitchClass::G => 7,
            PitchClass::Gs => 8,
            PitchClass::A => 9,
            PitchClass::As => 10,
            PitchClass::B => 11,
        }
    }

    /// Pitch class of a MIDI pitch (or any semitone count).
    pub const fn of(pitch: u8) -> PitchClass {
        Self::ALL[(pitch % 12) as usize]
    }
}

/// Key mode. Only the two modes the key estimator votes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Major,
    Minor,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Major, Mode::Minor];

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Major => "Major",
            Mode::Minor => "Minor",
        }
    }

    /// Semitone intervals from root for this mode's scale
    pub const fn intervals(self) -> &'static [u8] {
        match self {
            Mode::Major => &[0, 2, 4, 5, 7, 9, 11],
            // Natural minor: same pitch classes as the relative major
            Mode::Minor => &[0, 2, 3, 5, 7, 8, 10],
        }
    }

    /// Root, third and fifth
    pub const fn arpeggio_intervals(self) -> &'static [u8] {
        match self {
            Mode::Major => &[0, 4, 7],
            Mode::Minor => &[0, 3, 7],
        }
    }

    const fn index_offset(self) -> usize {
        match self {
            Mode::Major => 0,
            Mode::Minor => 12,
        }
    }
}

/// Set of MIDI pitches 0..=127 stored as a 128-bit mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PitchSet(u128);

impl PitchSet {
    pub const EMPTY: PitchSet = PitchSet(0);

    /// Every pitch in 0..=127 whose interval above `root` (mod 12) is in `intervals`.
    pub const fn from_pattern(root: u8, intervals: &[u8]) -> Self {
        let root = root % 12;
        let mut bits = 0u128;
        let mut pitch: u8 = 0;
        while pitch <= MAX_PITCH {
            let degree = (pitch + 12 - root) % 12;
            let mut i = 0;
            while i < intervals.len() {
                if intervals[i] == degree {
                    bits |= 1u128 << pitch;
                }
                i += 1;
            }
            pitch += 1;
        }
        PitchSet(bits)
    }

    #[inline]
    pub const fn contains(self, pitch: u8) -> bool {
        pitch <= MAX_PITCH && (self.0 >> pitch) & 1 == 1
    }

    pub fn insert(&mut self, pitch: u8) {
        if pitch <= MAX_PITCH {
            self.0 |= 1u128 << pitch;
        }
    }

    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn is_subset(self, other: PitchSet) -> bool {
        self.0 & !other.0 == 0
    }

    /// Members in ascending order.
    pub fn iter(self) -> impl Iterator<Item = u8> {
        (0..=MAX_PITCH).filter(move |&p| self.contains(p))
    }
}

/// One of the 24 major/minor keys.
///
/// Index layout: 0-11 are C Major .. B Major, 12-23 are C Minor .. B Minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    pub root: PitchClass,
    pub mode: Mode,
}

const KEY_NAMES: [&str; KEY_COUNT] = [
    "C Major", "C# Major", "D Major", "D# Major", "E Major", "F Major",
    "F# Major", "G Major", "G# Major", "A Major", "A# Major", "B Major",
    "C Minor", "C# Minor", "D Minor", "D# Minor", "E Minor", "F Minor",
    "F# Minor", "G Minor", "G# Minor", "A Minor", "A# Minor", "B Minor",
];

/// (scale set, arpeggio set) per key index, generated at compile time.
static KEY_SETS: [(PitchSet, PitchSet); KEY_COUNT] = build_key_sets();

const fn build_key_sets() -> [(PitchSet, PitchSet); KEY_COUNT] {
    let mut sets = [(PitchSet::EMPTY, PitchSet::EMPTY); KEY_COUNT];
    let mut index = 0;
    while index < KEY_COUNT {
        let mode = if index < 12 { Mode::Major } else { Mode::Minor };
        let root = (index % 12) as u8;
        sets[index] = (
            PitchSet::from_pattern(root, mode.intervals()),
            PitchSet::from_pattern(root, mode.arpeggio_intervals()),
        );
        index += 1;
    }
    sets
}

impl Key {
    pub const fn new(root: PitchClass, mode: Mode) -> Self {
        Self { root, mode }
    }

    pub const fn from_index(index: usize) -> Option<Key> {
        if index >= KEY_COUNT {
            return None;
        }
        let mode = if index < 12 { Mode::Major } else { Mode::Minor };
        Some(Key {
            root: PitchClass::of((index % 12) as u8),
            mode,
        })
    }

    pub const fn index(self) -> usize {
        self.mode.index_offset() + self.root.semitone() as usize
    }

    /// All 24 keys in index order.
    pub fn all() -> impl Iterator<Item = Key> {
        (0..KEY_COUNT).filter_map(Key::from_index)
    }

    /// Display name, e.g. "C# Minor"
    pub fn name(self) -> &'static str {
        KEY_NAMES[self.index()]
    }

    /// All octave transpositions of the scale tones.
    pub fn scale_set(self) -> PitchSet {
        KEY_SETS[self.index()].0
    }

    /// Root, third and fifth across all octaves.
    pub fn arpeggio_set(self) -> PitchSet {
        KEY_SETS[self.index()].1
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn pitch_class_all_has_12() {
        assert_eq!(PitchClass::ALL.len(), 12);
    }

    #[test]
    fn pitch_class_semitones_0_to_11() {
        let semitones: Vec<u8> = PitchClass::ALL.iter().map(|k| k.semitone()).collect();
        assert_eq!(semitones, (0..12).collect::<Vec<u8>>());
    }

    #[test]
    fn pitch_class_of_wraps_octaves() {
        assert_eq!(PitchClass::of(60), PitchClass::C);
        assert_eq!(PitchClass::of(127), PitchClass::G);
    }

    #[test]
    fn key_index_round_trip() {
        for index in 0..KEY_COUNT {
            let key = Key::from_index(index).unwrap();
            assert_eq!(key.index(), index);
        }
        assert_eq!(Key::from_index(KEY_COUNT), None);
    }

    #[test]
    fn key_names_unique() {
        let names: HashSet<&str> = Key::all().map(|k| k.name()).collect();
        assert_eq!(names.len(), KEY_COUNT);
    }

    #[test]
    fn key_layout_majors_then_minors() {
        assert_eq!(Key::from_index(0).unwrap().name(), "C Major");
        assert_eq!(Key::from_index(11).unwrap().name(), "B Major");
        assert_eq!(Key::from_index(12).unwrap().name(), "C Minor");
        assert_eq!(Key::from_index(21).unwrap().name(), "A Minor");
    }

    #[test]
    fn c_major_scale_set() {
        let set = Key::new(PitchClass::C, Mode::Major).scale_set();
        assert_eq!(set.len(), 75);
        assert_eq!(set.iter().take(8).collect::<Vec<_>>(), vec![0, 2, 4, 5, 7, 9, 11, 12]);
        assert!(set.contains(127));
        assert!(!set.contains(61));
    }

    #[test]
    fn c_major_arpeggio_set() {
        let set = Key::new(PitchClass::C, Mode::Major).arpeggio_set();
        assert_eq!(set.len(), 33);
        assert_eq!(set.iter().take(6).collect::<Vec<_>>(), vec![0, 4, 7, 12, 16, 19]);
        assert!(set.contains(127));
    }

    #[test]
    fn c_minor_sets() {
        let key = Key::new(PitchClass::C, Mode::Minor);
        assert_eq!(key.arpeggio_set().iter().take(4).collect::<Vec<_>>(), vec![0, 3, 7, 12]);
        // Same pitch classes as D# major
        let relative = Key::new(PitchClass::Ds, Mode::Major);
        assert_eq!(key.scale_set(), relative.scale_set());
    }

    #[test]
    fn arpeggio_is_subset_of_scale() {
        for key in Key::all() {
            assert!(key.arpeggio_set().is_subset(key.scale_set()), "{}", key);
        }
    }

    #[test]
    fn pitch_set_rejects_out_of_range() {
        let mut set = PitchSet::EMPTY;
        set.insert(200);
        assert!(set.is_empty());
        assert!(!Key::new(PitchClass::C, Mode::Major).scale_set().contains(200));
    }
}
