//! The generation engine: one call to [`Engine::process_block`] per block.
//!
//! Block order: control commands, learning, generation, note-off flush,
//! status publish. Nothing here blocks or fails; faults are counted in
//! [`EngineCounters`](crate::handle::EngineCounters).

use std::fmt::Write;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use impro_types::{
    decode_token_into, encode_token_into, ChordAggregator, EngineConfig, NoteEvent, NoteEventKind, MAX_PITCH,
    MAX_VELOCITY,
};

use crate::chain::{ChainAdapter, MarkovChain};
use crate::commands::{EngineCmd, EngineFeedback};
use crate::handle::{EngineStatus, SharedControl};
use crate::key_estimator::{KeyChange, KeyEstimator};
use crate::model_store::{ModelImport, ModelState};
use crate::perturbation;
use crate::rng::{create_rng, EngineRng};
use crate::scheduler::Scheduler;
use crate::triple_buffer::TripleBufferWriter;

const MAX_COMMANDS_PER_BLOCK: usize = 32;
const MAX_INJECTED_PER_BLOCK: usize = 64;
const PITCHES: usize = MAX_PITCH as usize + 1;
const DEFAULT_SAMPLE_RATE: f64 = 48_000.0;

pub struct Engine {
    config: EngineConfig,
    control: Arc<SharedControl>,
    cmd_rx: Receiver<EngineCmd>,
    feedback_tx: Sender<EngineFeedback>,
    status_tx: TripleBufferWriter<EngineStatus>,
    rng: EngineRng,

    key: KeyEstimator,
    chords: ChordAggregator,
    scheduler: Scheduler,
    pitch: MarkovChain,
    ioi: MarkovChain,
    duration: MarkovChain,
    velocity: MarkovChain,

    /// Learned IOI range in samples, `[ioi_min, ioi_max)`
    ioi_min: u64,
    ioi_max: u64,
    last_note_on: Option<u64>,
    note_on_times: [Option<u64>; PITCHES],
    randomness: f32,

    // Scratch buffers reused every block
    injected: Vec<NoteEvent>,
    decoded: Vec<u8>,
    token: String,
}

impl Engine {
    pub(crate) fn new(
        config: EngineConfig,
        control: Arc<SharedControl>,
        cmd_rx: Receiver<EngineCmd>,
        feedback_tx: Sender<EngineFeedback>,
        status_tx: TripleBufferWriter<EngineStatus>,
    ) -> Self {
        let randomness = control.randomness();
        let mut engine = Self {
            key: KeyEstimator::new(config.key_decay_ceiling),
            chords: ChordAggregator::new(config.chord_window_samples(DEFAULT_SAMPLE_RATE)),
            rng: create_rng(config.seed),
            config,
            control,
            cmd_rx,
            feedback_tx,
            status_tx,
            scheduler: Scheduler::new(),
            pitch: MarkovChain::new(),
            ioi: MarkovChain::new(),
            duration: MarkovChain::new(),
            velocity: MarkovChain::new(),
            ioi_min: 1,
            ioi_max: 1,
            last_note_on: None,
            note_on_times: [None; PITCHES],
            randomness: -1.0,
            injected: Vec::with_capacity(MAX_INJECTED_PER_BLOCK),
            decoded: Vec::with_capacity(16),
            token: String::with_capacity(64),
        };
        engine.prepare(DEFAULT_SAMPLE_RATE);
        engine.sync_randomness(randomness);
        engine
    }

    /// Configure sample-rate dependent windows. Call once at stream start.
    pub fn prepare(&mut self, sample_rate: f64) {
        self.chords.set_window(self.config.chord_window_samples(sample_rate));
        let (min, max) = self.config.ioi_bounds(sample_rate);
        self.ioi_min = min;
        self.ioi_max = max;
        log::info!(
            target: "engine",
            "prepared at {} Hz: chord window {} samples, ioi [{}, {})",
            sample_rate,
            self.chords.window(),
            min,
            max
        );
    }

    pub fn clock(&self) -> u64 {
        self.scheduler.clock()
    }

    /// Run one block. `out` is cleared and filled with the generated
    /// note-ons and note-offs, all at offset 0.
    pub fn process_block(&mut self, input: &[NoteEvent], block_len: u32, out: &mut Vec<NoteEvent>) {
        out.clear();
        self.drain_commands();
        self.sync_randomness(self.control.randomness());
        if self.key.is_stale() {
            if let Some(change) = self.key.refresh() {
                self.notify_key(change);
            }
        }

        let block_start = self.scheduler.clock();
        if self.control.learning() {
            let injected = std::mem::take(&mut self.injected);
            for event in &injected {
                self.learn(event, block_start);
            }
            self.injected = injected;
            for event in input {
                self.learn(event, block_start.saturating_add(event.offset as u64));
            }
        }
        self.injected.clear();

        self.scheduler.advance(block_len as u64);
        if self.control.generating() {
            self.generate(out);
        }
        self.scheduler.flush_due(out);
        self.publish_status();
    }

    /// Note-off for everything still sounding. Used when the stream stops.
    pub fn release_all(&mut self, out: &mut Vec<NoteEvent>) {
        self.scheduler.release_all(out);
    }

    /// Full copy of the learned state.
    pub fn snapshot(&self) -> ModelState {
        ModelState {
            pitch: self.pitch.clone(),
            ioi: self.ioi.clone(),
            duration: self.duration.clone(),
            velocity: self.velocity.clone(),
            key_scores: *self.key.scores(),
        }
    }

    fn drain_commands(&mut self) {
        for _ in 0..MAX_COMMANDS_PER_BLOCK {
            match self.cmd_rx.try_recv() {
                Ok(cmd) => self.handle_cmd(cmd),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return,
            }
        }
    }

    fn handle_cmd(&mut self, cmd: EngineCmd) {
        match cmd {
            EngineCmd::Reset => self.reset(),
            EngineCmd::Snapshot => {
                let state = Box::new(self.snapshot());
                self.send_feedback(EngineFeedback::Snapshot(state));
            }
            EngineCmd::Load(import) => self.apply_import(import),
            EngineCmd::InjectNote(event) => {
                if self.injected.len() < MAX_INJECTED_PER_BLOCK {
                    self.injected.push(event);
                } else {
                    self.control.counters.add_dropped_command();
                }
            }
        }
    }

    fn reset(&mut self) {
        self.pitch.reset();
        self.ioi.reset();
        self.duration.reset();
        self.velocity.reset();
        self.chords.reset();
        self.scheduler.reset();
        self.last_note_on = None;
        self.note_on_times = [None; PITCHES];
        if let Some(change) = self.key.reset() {
            self.notify_key(change);
        }
        log::info!(target: "engine", "model reset");
    }

    /// Swap loaded chains in and send the displaced ones back for freeing.
    fn apply_import(&mut self, mut import: Box<ModelImport>) {
        let slots = [
            (&mut import.pitch, &mut self.pitch),
            (&mut import.ioi, &mut self.ioi),
            (&mut import.duration, &mut self.duration),
            (&mut import.velocity, &mut self.velocity),
        ];
        for (loaded, chain) in slots {
            if let Some(loaded) = loaded {
                std::mem::swap(loaded, chain);
                chain.set_randomness(self.randomness);
            }
        }
        self.key.merge_scores(&import.key_scores);
        self.scheduler.set_bootstrapped(!self.pitch.is_empty());
        log::info!(target: "engine::model", "model loaded, bootstrapped={}", self.scheduler.bootstrapped());
        self.send_feedback(EngineFeedback::Retired(import));
    }

    fn sync_randomness(&mut self, randomness: f32) {
        if randomness == self.randomness {
            return;
        }
        self.randomness = randomness;
        for chain in [&mut self.pitch, &mut self.ioi, &mut self.duration, &mut self.velocity] {
            chain.set_randomness(randomness);
        }
    }

    fn learn(&mut self, event: &NoteEvent, time: u64) {
        let pitch = event.pitch;
        if pitch > MAX_PITCH {
            self.control.counters.add_invalid_event();
            return;
        }
        match event.kind {
            NoteEventKind::NoteOn { velocity } if velocity > 0 => {
                if let Some(change) = self.key.observe(pitch) {
                    self.notify_key(change);
                }

                self.chords.add_note(pitch, time);
                if let Some(chord) = self.chords.take_chord() {
                    encode_token_into(chord, &mut self.token);
                    if self.pitch.observe(&self.token) && !self.scheduler.bootstrapped() {
                        log::debug!(target: "engine", "bootstrapped at sample {}", time);
                        self.scheduler.set_bootstrapped(true);
                    }
                }

                if let Some(last) = self.last_note_on {
                    let ioi = time.saturating_sub(last);
                    if ioi >= self.ioi_min && ioi < self.ioi_max {
                        self.token.clear();
                        let _ = write!(self.token, "{}", ioi);
                        self.ioi.observe(&self.token);
                    }
                }
                self.last_note_on = Some(time);
                self.note_on_times[pitch as usize] = Some(time);

                self.token.clear();
                let _ = write!(self.token, "{}", velocity);
                self.velocity.observe(&self.token);
            }
            NoteEventKind::NoteOn { .. } | NoteEventKind::NoteOff => {
                if let Some(on) = self.note_on_times[pitch as usize].take() {
                    self.token.clear();
                    let _ = write!(self.token, "{}", time.saturating_sub(on));
                    self.duration.observe(&self.token);
                }
            }
        }
    }

    fn generate(&mut self, out: &mut Vec<NoteEvent>) {
        if !self.scheduler.gate_open() || self.duration.is_empty() || self.velocity.is_empty() {
            return;
        }

        let token = self.pitch.sample(false, &mut self.rng);
        let skipped = decode_token_into(token, &mut self.decoded);
        if skipped > 0 {
            self.control.counters.add_malformed(skipped as u64);
        }

        let key = self.key.current();
        for &pitch in &self.decoded {
            let Ok(duration) = self.duration.sample(true, &mut self.rng).trim().parse::<u64>() else {
                self.control.counters.add_malformed(1);
                continue;
            };
            let Ok(velocity) = self.velocity.sample(true, &mut self.rng).trim().parse::<u32>() else {
                self.control.counters.add_malformed(1);
                continue;
            };
            let velocity = velocity.clamp(1, MAX_VELOCITY as u32) as u8;
            let played = perturbation::adjust(pitch, key, self.randomness, &mut self.rng);
            out.push(NoteEvent::note_on(played, velocity, 0));
            self.scheduler.book_note_off(played, duration);
        }

        let ioi = match self.ioi.sample(false, &mut self.rng).trim().parse::<u64>() {
            Ok(ioi) if ioi > 0 => ioi,
            _ => {
                self.control.counters.add_clamped_ioi();
                self.ioi_min
            }
        };
        self.scheduler.set_next_deadline(ioi);
    }

    fn notify_key(&mut self, change: KeyChange) {
        log::debug!(target: "engine", "key changed to {:?}", change.name());
        self.send_feedback(EngineFeedback::KeyChanged {
            key: change.key,
            name: change.name(),
        });
    }

    fn send_feedback(&self, msg: EngineFeedback) {
        if self.feedback_tx.try_send(msg).is_err() {
            self.control.counters.add_dropped_feedback();
        }
    }

    fn publish_status(&mut self) {
        let clock = self.scheduler.clock();
        let key = self.key.current();
        let key_scores = *self.key.scores();
        let bootstrapped = self.scheduler.bootstrapped();
        let pending_note_offs = self.scheduler.pending_count();
        let chain_tokens = [
            self.pitch.token_count(),
            self.ioi.token_count(),
            self.duration.token_count(),
            self.velocity.token_count(),
        ];
        self.status_tx.publish_with(|status| {
            status.clock = clock;
            status.key = key;
            status.key_scores = key_scores;
            status.bootstrapped = bootstrapped;
            status.pending_note_offs = pending_note_offs;
            status.chain_tokens = chain_tokens;
        });
    }
}
