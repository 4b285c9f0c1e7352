/// Engine tuning values, resolved from config.toml by impro-core.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Notes closer together than this (from the first note) form one chord
    pub chord_window_ms: f64,
    /// Shortest inter-onset interval that is learned; also the floor a
    /// sampled zero interval is clamped to
    pub ioi_min_secs: f64,
    /// Inter-onset intervals at or above this are not learned
    pub ioi_max_secs: f64,
    /// Fixed RNG seed for reproducible sessions; `None` seeds from entropy
    pub seed: Option<u64>,
    /// When set, all key scores are halved once the leading score exceeds it
    pub key_decay_ceiling: Option<u32>,
    /// Initial perturbation / chain randomness (0.0-1.0)
    pub randomness: f32,
    /// Learn from incoming notes at startup
    pub learning: bool,
    /// Generate notes at startup
    pub generating: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chord_window_ms: 50.0,
            ioi_min_secs: 0.05,
            ioi_max_secs: 2.0,
            seed: None,
            key_decay_ceiling: None,
            randomness: 0.0,
            learning: false,
            generating: false,
        }
    }
}

impl EngineConfig {
    /// Chord clustering window in samples at `sample_rate`.
    pub fn chord_window_samples(&self, sample_rate: f64) -> u64 {
        secs_to_samples(self.chord_window_ms / 1000.0, sample_rate)
    }

    /// Accepted inter-onset interval range in samples, `[min, max)`.
    /// `min` is at least one sample so a clamped interval always advances time.
    pub fn ioi_bounds(&self, sample_rate: f64) -> (u64, u64) {
        let min = secs_to_samples(self.ioi_min_secs, sample_rate).max(1);
        let max = secs_to_samples(self.ioi_max_secs, sample_rate).max(min);
        (min, max)
    }
}

fn secs_to_samples(secs: f64, sample_rate: f64) -> u64 {
    if !secs.is_finite() || !sample_rate.is_finite() || secs <= 0.0 || sample_rate <= 0.0 {
        return 0;
    }
    (secs * sample_rate).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bounds_at_48k() {
        let config = EngineConfig::default();
        assert_eq!(config.chord_window_samples(48_000.0), 2400);
        assert_eq!(config.ioi_bounds(48_000.0), (2400, 96_000));
    }

    #[test]
    fn ioi_floor_never_zero() {
        let config = EngineConfig {
            ioi_min_secs: 0.0,
            ..Default::default()
        };
        assert_eq!(config.ioi_bounds(44_100.0).0, 1);
    }

    #[test]
    fn degenerate_sample_rate() {
        let config = EngineConfig::default();
        assert_eq!(config.chord_window_samples(0.0), 0);
        assert_eq!(config.ioi_bounds(f64::NAN), (1, 1));
    }
}
