use std::path::PathBuf;

use serde::Deserialize;

use impro_types::EngineConfig;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

const DEFAULT_SAMPLE_RATE: u32 = 48_000;
const DEFAULT_BLOCK_SIZE: u32 = 512;

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    engine: EngineSection,
    #[serde(default)]
    runtime: RuntimeSection,
}

#[derive(Deserialize, Default)]
struct EngineSection {
    chord_window_ms: Option<f64>,
    ioi_min_secs: Option<f64>,
    ioi_max_secs: Option<f64>,
    seed: Option<u64>,
    key_decay_ceiling: Option<u32>,
    randomness: Option<f32>,
    learning: Option<bool>,
    generating: Option<bool>,
}

#[derive(Deserialize, Default)]
struct RuntimeSection {
    sample_rate: Option<u32>,
    block_size: Option<u32>,
    midi_channel: Option<u8>,
    model_dir: Option<String>,
}

pub struct Config {
    engine: EngineSection,
    runtime: RuntimeSection,
}

impl Config {
    /// Embedded defaults merged with `<config_dir>/impro/config.toml`.
    pub fn load() -> Self {
        let user = user_config_path().filter(|path| path.exists()).and_then(|path| {
            match std::fs::read_to_string(&path) {
                Ok(contents) => Some(contents),
                Err(e) => {
                    log::warn!(target: "config", "could not read config {}: {}", path.display(), e);
                    None
                }
            }
        });
        Self::from_sources(DEFAULT_CONFIG, user.as_deref())
    }

    /// Parse `base`, then overlay every value present in `user`.
    pub fn from_sources(base: &str, user: Option<&str>) -> Self {
        let mut config: ConfigFile = toml::from_str(base).unwrap_or_else(|e| {
            log::error!(target: "config", "embedded config is malformed, using built-in values: {}", e);
            ConfigFile::default()
        });

        if let Some(user) = user {
            match toml::from_str::<ConfigFile>(user) {
                Ok(user) => {
                    merge_engine(&mut config.engine, user.engine);
                    merge_runtime(&mut config.runtime, user.runtime);
                }
                Err(e) => log::warn!(target: "config", "ignoring malformed user config: {}", e),
            }
        }

        Config {
            engine: config.engine,
            runtime: config.runtime,
        }
    }

    /// Engine settings with out-of-range values replaced by defaults.
    pub fn engine(&self) -> EngineConfig {
        let fallback = EngineConfig::default();
        let positive = |value: Option<f64>, default: f64| {
            value.filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(default)
        };

        let mut ioi_min_secs = positive(self.engine.ioi_min_secs, fallback.ioi_min_secs);
        let mut ioi_max_secs = positive(self.engine.ioi_max_secs, fallback.ioi_max_secs);
        if ioi_max_secs <= ioi_min_secs {
            log::warn!(
                target: "config",
                "ioi_max_secs {} is not above ioi_min_secs {}, using defaults",
                ioi_max_secs,
                ioi_min_secs
            );
            ioi_min_secs = fallback.ioi_min_secs;
            ioi_max_secs = fallback.ioi_max_secs;
        }

        EngineConfig {
            chord_window_ms: positive(self.engine.chord_window_ms, fallback.chord_window_ms),
            ioi_min_secs,
            ioi_max_secs,
            seed: self.engine.seed,
            key_decay_ceiling: self.engine.key_decay_ceiling.filter(|&c| c > 0),
            randomness: self
                .engine
                .randomness
                .filter(|r| r.is_finite())
                .unwrap_or(fallback.randomness)
                .clamp(0.0, 1.0),
            learning: self.engine.learning.unwrap_or(fallback.learning),
            generating: self.engine.generating.unwrap_or(fallback.generating),
        }
    }

    /// Processing sample rate in Hz (clamped to 8000..=192000).
    pub fn sample_rate(&self) -> u32 {
        self.runtime
            .sample_rate
            .unwrap_or(DEFAULT_SAMPLE_RATE)
            .clamp(8_000, 192_000)
    }

    /// Samples per processing block (clamped to 16..=8192).
    pub fn block_size(&self) -> u32 {
        self.runtime
            .block_size
            .unwrap_or(DEFAULT_BLOCK_SIZE)
            .clamp(16, 8_192)
    }

    /// Output MIDI channel, 1-16.
    pub fn midi_channel(&self) -> u8 {
        self.runtime.midi_channel.unwrap_or(1).clamp(1, 16)
    }

    /// Configured model directory with a leading `~` expanded.
    pub fn model_dir(&self) -> Option<PathBuf> {
        let dir = self.runtime.model_dir.as_deref()?;
        match dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
            None => Some(PathBuf::from(dir)),
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("impro").join("config.toml"))
}

fn merge_engine(base: &mut EngineSection, user: EngineSection) {
    if user.chord_window_ms.is_some() {
        base.chord_window_ms = user.chord_window_ms;
    }
    if user.ioi_min_secs.is_some() {
        base.ioi_min_secs = user.ioi_min_secs;
    }
    if user.ioi_max_secs.is_some() {
        base.ioi_max_secs = user.ioi_max_secs;
    }
    if user.seed.is_some() {
        base.seed = user.seed;
    }
    if user.key_decay_ceiling.is_some() {
        base.key_decay_ceiling = user.key_decay_ceiling;
    }
    if user.randomness.is_some() {
        base.randomness = user.randomness;
    }
    if user.learning.is_some() {
        base.learning = user.learning;
    }
    if user.generating.is_some() {
        base.generating = user.generating;
    }
}

fn merge_runtime(base: &mut RuntimeSection, user: RuntimeSection) {
    if user.sample_rate.is_some() {
        base.sample_rate = user.sample_rate;
    }
    if user.block_size.is_some() {
        base.block_size = user.block_size;
    }
    if user.midi_channel.is_some() {
        base.midi_channel = user.midi_channel;
    }
    if user.model_dir.is_some() {
        base.model_dir = user.model_dir;
    }
}
