//! Sequence models for the four note attributes.
//!
//! `ChainAdapter` is the uniform interface the engine drives; `MarkovChain`
//! is the first-order implementation used for pitch tokens, inter-onset
//! intervals, durations and velocities.

use std::collections::HashMap;

use rand::Rng;

use impro_types::EMPTY_CHORD_TOKEN;

/// Characters that may not appear in a token: they delimit the export
/// format (`,` and newlines) or the model blob tags (`#`).
const RESERVED: [char; 4] = [',', '\n', '\r', '#'];

/// Uniform interface over the per-attribute sequence models.
pub trait ChainAdapter {
    /// Record a transition from the current learning state to `token`.
    /// Returns false if the token was rejected.
    fn observe(&mut self, token: &str) -> bool;

    /// Draw a next token. With `peek == false` the playback state also
    /// advances as if that token had occurred.
    fn sample<R: Rng + ?Sized>(&mut self, peek: bool, rng: &mut R) -> &str;

    fn randomness(&self) -> f32;

    fn set_randomness(&mut self, randomness: f32);

    fn reset(&mut self);

    fn export(&self) -> String;

    /// Replace the chain with an exported one. Empty text is a no-op.
    fn import(&mut self, text: &str);

    /// True until at least one token has been observed or imported.
    fn is_empty(&self) -> bool;
}

/// First-order Markov chain over interned string tokens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkovChain {
    /// Interned tokens, indexed by id
    tokens: Vec<String>,
    index: HashMap<String, usize>,
    /// Observed successors per token id; repeats weight the draw
    successors: Vec<Vec<usize>>,
    /// Last observed token (learning side)
    learn_state: Option<usize>,
    /// Last emitted token (playback side)
    play_state: Option<usize>,
    randomness: f32,
}

impl MarkovChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct tokens seen.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Total number of recorded transitions.
    pub fn transition_count(&self) -> usize {
        self.successors.iter().map(Vec::len).sum()
    }

    fn intern(&mut self, token: &str) -> usize {
        if let Some(&id) = self.index.get(token) {
            return id;
        }
        let id = self.tokens.len();
        self.tokens.push(token.to_string());
        self.index.insert(token.to_string(), id);
        self.successors.push(Vec::new());
        id
    }

    fn is_valid_token(token: &str) -> bool {
        !token.trim().is_empty() && !token.contains(RESERVED)
    }
}

impl ChainAdapter for MarkovChain {
    fn observe(&mut self, token: &str) -> bool {
        if !Self::is_valid_token(token) {
            log::warn!(target: "engine::chain", "rejected token {:?}", token);
            return false;
        }
        let id = self.intern(token);
        if let Some(prev) = self.learn_state {
            self.successors[prev].push(id);
        }
        self.learn_state = Some(id);
        true
    }

    fn sample<R: Rng + ?Sized>(&mut self, peek: bool, rng: &mut R) -> &str {
        if self.tokens.is_empty() {
            return EMPTY_CHORD_TOKEN;
        }

        // Follow from the playback state; before anything has been played,
        // continue from the most recently learned token.
        let wander = rng.gen::<f32>() < self.randomness;
        let context = self.play_state.or(self.learn_state);
        let next = match context.map(|id| &self.successors[id]) {
            Some(nexts) if !nexts.is_empty() && !wander => nexts[rng.gen_range(0..nexts.len())],
            _ => rng.gen_range(0..self.tokens.len()),
        };

        if !peek {
            self.play_state = Some(next);
        }
        &self.tokens[next]
    }

    fn randomness(&self) -> f32 {
        self.randomness
    }

    fn set_randomness(&mut self, randomness: f32) {
        self.randomness = randomness.clamp(0.0, 1.0);
    }

    fn reset(&mut self) {
        self.tokens.clear();
        self.index.clear();
        self.successors.clear();
        self.learn_state = None;
        self.play_state = None;
    }

    /// One line per token: `token,next,next,...`, sorted by token.
    /// Tokens without successors get a line of their own so they survive
    /// a round trip.
    fn export(&self) -> String {
        let mut order: Vec<usize> = (0..self.tokens.len()).collect();
        order.sort_by(|&a, &b| self.tokens[a].cmp(&self.tokens[b]));

        let mut out = String::new();
        for id in order {
            out.push_str(&self.tokens[id]);
            for &next in &self.successors[id] {
                out.push(',');
                out.push_str(&self.tokens[next]);
            }
            out.push('\n');
        }
        out
    }

    fn import(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        let mut chain = MarkovChain {
            randomness: self.randomness,
            ..Default::default()
        };
        let mut skipped = 0usize;
        for line in text.lines() {
            let mut fields = line.split(',').map(str::trim);
            let source = match fields.next() {
                Some(source) if Self::is_valid_token(source) => source,
                _ => {
                    if !line.trim().is_empty() {
                        skipped += 1;
                    }
                    continue;
                }
            };
            let from = chain.intern(source);
            for next in fields.filter(|f| Self::is_valid_token(f)) {
                let to = chain.intern(next);
                chain.successors[from].push(to);
            }
        }
        if skipped > 0 {
            log::warn!(target: "engine::chain", "skipped {} malformed chain lines on import", skipped);
        }
        *self = chain;
    }

    fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
