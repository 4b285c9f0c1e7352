//! The processing thread: drives the engine at block cadence from the wall
//! clock, feeding it MIDI input and passing its output to a [`NoteSink`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use impro_audio::{BlockTelemetry, Engine};
use impro_types::NoteEvent;

use crate::midi::{MidiEvent, NoteSink};

/// How often the telemetry summary is logged.
const SUMMARY_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub block_size: u32,
}

impl SessionConfig {
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate.max(1) as f64)
    }
}

/// Running processing thread. Stops on drop.
pub struct Session {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<Engine>>,
}

impl Session {
    pub fn start(
        mut engine: Engine,
        input: Option<Receiver<MidiEvent>>,
        sink: Box<dyn NoteSink>,
        config: SessionConfig,
    ) -> Result<Self, String> {
        engine.prepare(config.sample_rate as f64);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let join = thread::Builder::new()
            .name("impro-engine".to_string())
            .spawn(move || run(engine, input, sink, config, thread_stop))
            .map_err(|e| format!("Failed to start processing thread: {}", e))?;
        log::info!(
            target: "engine",
            "processing started: {} Hz, {} samples per block",
            config.sample_rate,
            config.block_size
        );
        Ok(Self {
            stop,
            join: Some(join),
        })
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().map_or(false, |join| !join.is_finished())
    }

    /// Stop the thread, releasing any sounding notes first. Returns the
    /// engine so its state can be inspected.
    pub fn stop(&mut self) -> Option<Engine> {
        self.stop.store(true, Ordering::Relaxed);
        let engine = self.join.take()?.join();
        match engine {
            Ok(engine) => Some(engine),
            Err(_) => {
                log::error!(target: "engine", "processing thread panicked");
                None
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    mut engine: Engine,
    input: Option<Receiver<MidiEvent>>,
    mut sink: Box<dyn NoteSink>,
    config: SessionConfig,
    stop: Arc<AtomicBool>,
) -> Engine {
    let block = config.block_duration();
    let sample_rate = config.sample_rate as f64;
    let mut telemetry = BlockTelemetry::new(block);
    let mut last_summary = Instant::now();
    let mut events: Vec<NoteEvent> = Vec::with_capacity(64);
    let mut out: Vec<NoteEvent> = Vec::with_capacity(64);

    // Each block covers the wall-clock window [window_start, window_start + block)
    let mut window_start = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        let window_end = window_start + block;
        let now = Instant::now();
        if window_end > now {
            thread::sleep(window_end - now);
        }

        let started = Instant::now();
        events.clear();
        if let Some(rx) = &input {
            for midi in rx.try_iter() {
                let offset = arrival_offset(midi.received, window_start, sample_rate, config.block_size);
                events.push(midi.to_note_event(offset));
            }
        }
        events.sort_by_key(|e| e.offset);

        engine.process_block(&events, config.block_size, &mut out);
        if !out.is_empty() {
            sink.send(&out);
        }
        telemetry.record(started.elapsed());

        window_start = window_end;
        // Fell more than a block behind: drop the backlog instead of racing
        let lag = Instant::now().saturating_duration_since(window_start);
        if lag > block {
            log::warn!(target: "engine", "processing fell {:?} behind, resyncing", lag);
            window_start = Instant::now();
        }

        if last_summary.elapsed() >= SUMMARY_INTERVAL {
            let s = telemetry.take_summary();
            log::debug!(
                target: "engine",
                "blocks={} avg={}us p95={}us max={}us overruns={}",
                s.blocks,
                s.avg_us,
                s.p95_us,
                s.max_us,
                s.overruns
            );
            last_summary = Instant::now();
        }
    }

    engine.release_all(&mut out);
    if !out.is_empty() {
        sink.send(&out);
    }
    sink.all_notes_off();
    log::info!(target: "engine", "processing stopped at sample {}", engine.clock());
    engine
}

/// Sample offset of an event within the block starting at `window_start`.
/// Early arrivals land at 0 and late ones on the last sample.
pub fn arrival_offset(received: Instant, window_start: Instant, sample_rate: f64, block_size: u32) -> u32 {
    let elapsed = received.saturating_duration_since(window_start).as_secs_f64();
    let offset = (elapsed * sample_rate) as u64;
    offset.min(block_size.saturating_sub(1) as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use impro_audio::create_engine;
    use impro_types::EngineConfig;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Collector {
        events: Arc<Mutex<Vec<NoteEvent>>>,
        silenced: Arc<AtomicBool>,
    }

    impl NoteSink for Collector {
        fn send(&mut self, events: &[NoteEvent]) {
            self.events.lock().unwrap().extend_from_slice(events);
        }

        fn all_notes_off(&mut self) {
            self.silenced.store(true, Ordering::Relaxed);
        }
    }

    #[test]
    fn arrival_offsets() {
        let start = Instant::now();
        let sr = 48_000.0;
        assert_eq!(arrival_offset(start, start, sr, 512), 0);
        assert_eq!(arrival_offset(start + Duration::from_millis(5), start, sr, 512), 240);
        assert_eq!(arrival_offset(start + Duration::from_secs(1), start, sr, 512), 511);
        // arrived before the window opened
        assert_eq!(arrival_offset(start, start + Duration::from_millis(3), sr, 512), 0);
    }

    #[test]
    fn block_duration() {
        let config = SessionConfig {
            sample_rate: 48_000,
            block_size: 480,
        };
        assert_eq!(config.block_duration(), Duration::from_millis(10));
    }

    #[test]
    fn session_generates_and_releases_on_stop() {
        let (handle, engine) = create_engine(&EngineConfig {
            generating: true,
            seed: Some(8),
            ..Default::default()
        });
        handle
            .load_blob("#PITCH#60-,64-\n64-,60-\n#IOI#960,960\n#DURATION#48000,48000\n#VELOCITY#90,90\n")
            .unwrap();

        let sink = Collector::default();
        let mut session = Session::start(
            engine,
            None,
            Box::new(sink.clone()),
            SessionConfig {
                sample_rate: 48_000,
                block_size: 256,
            },
        )
        .unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(session.is_running());
        let engine = session.stop().unwrap();
        assert!(engine.clock() > 0);

        let events = sink.events.lock().unwrap();
        let ons = events.iter().filter(|e| e.is_note_on()).count();
        let offs = events.iter().filter(|e| !e.is_note_on()).count();
        assert!(ons > 0);
        // 1s durations outlast the session; every note is released on stop
        assert_eq!(offs, 2.min(ons));
        assert!(sink.silenced.load(Ordering::Relaxed));
    }
}
