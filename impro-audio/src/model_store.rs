//! The combined model blob: four chain exports plus the key score table.
//!
//! ```text
//! #PITCH#<chain>#IOI#<chain>#DURATION#<chain>#VELOCITY#<chain>#KEYARRAY#s0-s1-...-s23-
//! ```
//!
//! Parsing never runs on the real-time thread. [`parse_model`] produces a
//! [`ModelImport`] that the engine merges at a tick boundary.

use impro_types::KEY_COUNT;

use crate::chain::{ChainAdapter, MarkovChain};

pub const PITCH_TAG: &str = "#PITCH#";
pub const IOI_TAG: &str = "#IOI#";
pub const DURATION_TAG: &str = "#DURATION#";
pub const VELOCITY_TAG: &str = "#VELOCITY#";
pub const KEY_ARRAY_TAG: &str = "#KEYARRAY#";

const TAGS: [&str; 5] = [PITCH_TAG, IOI_TAG, DURATION_TAG, VELOCITY_TAG, KEY_ARRAY_TAG];

/// Full copy of the engine's learned state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelState {
    pub pitch: MarkovChain,
    pub ioi: MarkovChain,
    pub duration: MarkovChain,
    pub velocity: MarkovChain,
    pub key_scores: [u32; KEY_COUNT],
}

impl ModelState {
    pub fn export(&self) -> String {
        export_model(
            [&self.pitch, &self.ioi, &self.duration, &self.velocity],
            &self.key_scores,
        )
    }
}

/// Serialize four chains (pitch, IOI, duration, velocity) and the scores.
pub fn export_model<C: ChainAdapter>(chains: [&C; 4], key_scores: &[u32; KEY_COUNT]) -> String {
    let mut blob = String::new();
    for (tag, chain) in TAGS.iter().zip(chains) {
        blob.push_str(tag);
        blob.push_str(&chain.export());
    }
    blob.push_str(KEY_ARRAY_TAG);
    for score in key_scores {
        blob.push_str(&score.to_string());
        blob.push('-');
    }
    blob
}

/// A parsed blob. `None` entries leave the engine's current value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelImport {
    pub pitch: Option<MarkovChain>,
    pub ioi: Option<MarkovChain>,
    pub duration: Option<MarkovChain>,
    pub velocity: Option<MarkovChain>,
    pub key_scores: [Option<u32>; KEY_COUNT],
}

impl ModelImport {
    /// True if merging this import would change nothing.
    pub fn is_empty(&self) -> bool {
        self.pitch.is_none()
            && self.ioi.is_none()
            && self.duration.is_none()
            && self.velocity.is_none()
            && self.key_scores.iter().all(Option::is_none)
    }
}

pub fn parse_model(blob: &str) -> ModelImport {
    ModelImport {
        pitch: parse_chain(section(blob, PITCH_TAG)),
        ioi: parse_chain(section(blob, IOI_TAG)),
        duration: parse_chain(section(blob, DURATION_TAG)),
        velocity: parse_chain(section(blob, VELOCITY_TAG)),
        key_scores: parse_key_scores(section(blob, KEY_ARRAY_TAG)),
    }
}

/// Text after `tag` up to the nearest following tag, or to the end.
/// A missing tag yields an empty section.
fn section<'a>(blob: &'a str, tag: &str) -> &'a str {
    let Some(start) = blob.find(tag).map(|pos| pos + tag.len()) else {
        return "";
    };
    let rest = &blob[start..];
    let end = TAGS
        .iter()
        .filter_map(|other| rest.find(other))
        .min()
        .unwrap_or(rest.len());
    &rest[..end]
}

fn parse_chain(text: &str) -> Option<MarkovChain> {
    if text.trim().is_empty() {
        return None;
    }
    let mut chain = MarkovChain::new();
    chain.import(text);
    if chain.is_empty() {
        log::warn!(target: "engine::model", "chain section held no usable tokens");
        return None;
    }
    Some(chain)
}

fn parse_key_scores(text: &str) -> [Option<u32>; KEY_COUNT] {
    let mut scores = [None; KEY_COUNT];
    let fragments = text.split('-').map(str::trim).filter(|f| !f.is_empty());
    for (slot, fragment) in scores.iter_mut().zip(fragments) {
        *slot = fragment.parse().ok();
    }
    scores
}
