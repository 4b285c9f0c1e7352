//! EngineHandle: control-side interface to the engine.
//!
//! Flags and randomness live in atomics the engine reads once per block.
//! Everything else goes through a bounded command queue; the engine answers
//! on a bounded feedback queue and publishes an [`EngineStatus`] through a
//! triple buffer every block.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use impro_types::{EngineConfig, Key, NoteEvent, KEY_COUNT};

use crate::commands::{EngineCmd, EngineFeedback};
use crate::engine::Engine;
use crate::model_store::{parse_model, ModelImport, ModelState};
use crate::triple_buffer::{triple_buffer, TripleBufferReader};

const COMMAND_CAPACITY: usize = 256;
const FEEDBACK_CAPACITY: usize = 256;

/// Per-block snapshot published by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStatus {
    pub clock: u64,
    pub key: Option<Key>,
    pub key_scores: [u32; KEY_COUNT],
    pub bootstrapped: bool,
    pub pending_note_offs: usize,
    /// Distinct tokens in the pitch, IOI, duration and velocity chains
    pub chain_tokens: [usize; 4],
}

/// Faults the engine absorbed instead of failing.
#[derive(Debug, Default)]
pub struct EngineCounters {
    malformed_tokens: AtomicU64,
    clamped_iois: AtomicU64,
    invalid_events: AtomicU64,
    dropped_feedback: AtomicU64,
    dropped_commands: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub malformed_tokens: u64,
    pub clamped_iois: u64,
    pub invalid_events: u64,
    pub dropped_feedback: u64,
    pub dropped_commands: u64,
}

impl EngineCounters {
    pub(crate) fn add_malformed(&self, n: u64) {
        self.malformed_tokens.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_clamped_ioi(&self) {
        self.clamped_iois.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_invalid_event(&self) {
        self.invalid_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_dropped_feedback(&self) {
        self.dropped_feedback.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_dropped_command(&self) {
        self.dropped_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            malformed_tokens: self.malformed_tokens.load(Ordering::Relaxed),
            clamped_iois: self.clamped_iois.load(Ordering::Relaxed),
            invalid_events: self.invalid_events.load(Ordering::Relaxed),
            dropped_feedback: self.dropped_feedback.load(Ordering::Relaxed),
            dropped_commands: self.dropped_commands.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the handle and the engine.
#[derive(Debug)]
pub struct SharedControl {
    learning: AtomicBool,
    generating: AtomicBool,
    /// f32 bits
    randomness: AtomicU32,
    pub counters: EngineCounters,
}

impl SharedControl {
    fn new(config: &EngineConfig) -> Self {
        Self {
            learning: AtomicBool::new(config.learning),
            generating: AtomicBool::new(config.generating),
            randomness: AtomicU32::new(config.randomness.clamp(0.0, 1.0).to_bits()),
            counters: EngineCounters::default(),
        }
    }

    pub fn learning(&self) -> bool {
        self.learning.load(Ordering::Relaxed)
    }

    pub fn generating(&self) -> bool {
        self.generating.load(Ordering::Relaxed)
    }

    pub fn randomness(&self) -> f32 {
        f32::from_bits(self.randomness.load(Ordering::Relaxed))
    }
}

/// Build a connected handle/engine pair.
///
/// The engine is moved to the processing thread; the handle stays with the
/// control side.
pub fn create_engine(config: &EngineConfig) -> (EngineHandle, Engine) {
    let control = Arc::new(SharedControl::new(config));
    let (cmd_tx, cmd_rx) = bounded(COMMAND_CAPACITY);
    let (feedback_tx, feedback_rx) = bounded(FEEDBACK_CAPACITY);
    let (status_tx, status_rx) = triple_buffer(EngineStatus::default());

    let engine = Engine::new(config.clone(), Arc::clone(&control), cmd_rx, feedback_tx, status_tx);
    let handle = EngineHandle {
        control,
        cmd_tx,
        feedback_rx,
        pending: VecDeque::new(),
        status: status_rx,
    };
    (handle, engine)
}

pub struct EngineHandle {
    control: Arc<SharedControl>,
    cmd_tx: Sender<EngineCmd>,
    feedback_rx: Receiver<EngineFeedback>,
    /// Feedback received while waiting for a snapshot
    pending: VecDeque<EngineFeedback>,
    status: TripleBufferReader<EngineStatus>,
}

impl EngineHandle {
    pub fn set_learning(&self, on: bool) {
        self.control.learning.store(on, Ordering::Relaxed);
    }

    pub fn learning(&self) -> bool {
        self.control.learning()
    }

    pub fn set_generating(&self, on: bool) {
        self.control.generating.store(on, Ordering::Relaxed);
    }

    pub fn generating(&self) -> bool {
        self.control.generating()
    }

    /// Set chain and perturbation randomness, clamped to 0.0-1.0.
    pub fn set_randomness(&self, randomness: f32) {
        let randomness = if randomness.is_nan() { 0.0 } else { randomness.clamp(0.0, 1.0) };
        self.control.randomness.store(randomness.to_bits(), Ordering::Relaxed);
    }

    pub fn randomness(&self) -> f32 {
        self.control.randomness()
    }

    fn send(&self, cmd: EngineCmd) -> Result<(), String> {
        match self.cmd_tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.control.counters.add_dropped_command();
                Err("Engine command queue full".to_string())
            }
            Err(TrySendError::Disconnected(_)) => Err("Engine stopped".to_string()),
        }
    }

    pub fn reset(&self) -> Result<(), String> {
        self.send(EngineCmd::Reset)
    }

    pub fn request_snapshot(&self) -> Result<(), String> {
        self.send(EngineCmd::Snapshot)
    }

    pub fn load(&self, import: ModelImport) -> Result<(), String> {
        self.send(EngineCmd::Load(Box::new(import)))
    }

    /// Parse a model blob here, off the processing thread, and send it.
    pub fn load_blob(&self, blob: &str) -> Result<(), String> {
        let import = parse_model(blob);
        if import.is_empty() {
            log::warn!(target: "engine::model", "model blob contained nothing to load");
        }
        self.load(import)
    }

    pub fn inject_note(&self, event: NoteEvent) -> Result<(), String> {
        self.send(EngineCmd::InjectNote(event))
    }

    /// Request a snapshot and wait for it. Other feedback that arrives in
    /// the meantime is kept for the next `drain_feedback`.
    pub fn snapshot(&mut self, timeout: Duration) -> Result<ModelState, String> {
        self.request_snapshot()?;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.feedback_rx.recv_timeout(remaining) {
                Ok(EngineFeedback::Snapshot(state)) => return Ok(*state),
                Ok(EngineFeedback::Retired(_)) => {}
                Ok(other) => self.pending.push_back(other),
                Err(RecvTimeoutError::Timeout) => {
                    return Err("Timed out waiting for engine snapshot".to_string())
                }
                Err(RecvTimeoutError::Disconnected) => return Err("Engine stopped".to_string()),
            }
        }
    }

    /// Collect pending feedback. Retired chains are dropped here.
    pub fn drain_feedback(&mut self) -> Vec<EngineFeedback> {
        let mut out: Vec<EngineFeedback> = self.pending.drain(..).collect();
        out.extend(
            self.feedback_rx
                .try_iter()
                .filter(|msg| !matches!(msg, EngineFeedback::Retired(_))),
        );
        out
    }

    pub fn status(&mut self) -> EngineStatus {
        self.status.read()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.control.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_reach_shared_control() {
        let (handle, _engine) = create_engine(&EngineConfig::default());
        assert!(!handle.learning());
        handle.set_learning(true);
        handle.set_generating(true);
        assert!(handle.control.learning());
        assert!(handle.control.generating());
    }

    #[test]
    fn randomness_is_clamped() {
        let (handle, _engine) = create_engine(&EngineConfig::default());
        handle.set_randomness(1.5);
        assert_eq!(handle.randomness(), 1.0);
        handle.set_randomness(f32::NAN);
        assert_eq!(handle.randomness(), 0.0);
        handle.set_randomness(0.3);
        assert_eq!(handle.randomness(), 0.3);
    }

    #[test]
    fn initial_values_from_config() {
        let config = EngineConfig {
            learning: true,
            randomness: 0.4,
            ..Default::default()
        };
        let (handle, _engine) = create_engine(&config);
        assert!(handle.learning());
        assert!(!handle.generating());
        assert_eq!(handle.randomness(), 0.4);
    }

    #[test]
    fn full_queue_counts_dropped_commands() {
        let (handle, _engine) = create_engine(&EngineConfig::default());
        for _ in 0..COMMAND_CAPACITY {
            handle.reset().unwrap();
        }
        assert!(handle.reset().is_err());
        assert_eq!(handle.counters().dropped_commands, 1);
    }

    #[test]
    fn stopped_engine_is_an_error() {
        let (handle, engine) = create_engine(&EngineConfig::default());
        drop(engine);
        assert_eq!(handle.reset(), Err("Engine stopped".to_string()));
    }
}
