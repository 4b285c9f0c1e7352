//! Block processing time telemetry.
//!
//! Allocation-free; recorded once per block by the processing thread and
//! summarised periodically to the log.

use std::time::Duration;

const BLOCK_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySummary {
    pub avg_us: u32,
    pub max_us: u32,
    pub p95_us: u32,
    /// Blocks that took longer than their real-time budget (cumulative)
    pub overruns: u64,
    /// Blocks recorded since the previous summary
    pub blocks: u64,
}

pub struct BlockTelemetry {
    /// Ring buffer of block durations in microseconds
    durations_us: [u32; BLOCK_BUFFER_SIZE],
    idx: usize,
    /// Saturates at BLOCK_BUFFER_SIZE
    sample_count: usize,
    max_us: u32,
    overruns: u64,
    window_blocks: u64,
    budget_us: u32,
}

impl BlockTelemetry {
    /// `budget` is the wall-clock length of one block.
    pub fn new(budget: Duration) -> Self {
        Self {
            durations_us: [0; BLOCK_BUFFER_SIZE],
            idx: 0,
            sample_count: 0,
            max_us: 0,
            overruns: 0,
            window_blocks: 0,
            budget_us: budget.as_micros().min(u32::MAX as u128) as u32,
        }
    }

    /// Budget for `block_size` samples at `sample_rate`.
    pub fn for_block(block_size: usize, sample_rate: f64) -> Self {
        let secs = if sample_rate > 0.0 { block_size as f64 / sample_rate } else { 0.0 };
        Self::new(Duration::from_secs_f64(secs))
    }

    #[inline]
    pub fn record(&mut self, elapsed: Duration) {
        let us = elapsed.as_micros().min(u32::MAX as u128) as u32;
        self.durations_us[self.idx] = us;
        self.idx = (self.idx + 1) % BLOCK_BUFFER_SIZE;
        if self.sample_count < BLOCK_BUFFER_SIZE {
            self.sample_count += 1;
        }
        self.max_us = self.max_us.max(us);
        if us > self.budget_us {
            self.overruns += 1;
        }
        self.window_blocks += 1;
    }

    /// Summarise the buffered durations and start a new window.
    /// The overrun count stays cumulative.
    pub fn take_summary(&mut self) -> TelemetrySummary {
        if self.sample_count == 0 {
            return TelemetrySummary::default();
        }
        let samples = &self.durations_us[..self.sample_count];
        let sum: u64 = samples.iter().map(|&us| us as u64).sum();

        let mut sorted = self.durations_us;
        sorted[..self.sample_count].sort_unstable();
        let p95_idx = (self.sample_count * 95 / 100).max(1) - 1;

        let summary = TelemetrySummary {
            avg_us: (sum / self.sample_count as u64) as u32,
            max_us: self.max_us,
            p95_us: sorted[p95_idx],
            overruns: self.overruns,
            blocks: self.window_blocks,
        };
        self.max_us = 0;
        self.window_blocks = 0;
        summary
    }
}
