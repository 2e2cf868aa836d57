//! Built-in signal generator.
//!
//! Produces a tone that alternates between loud bursts and near silence, so
//! both acquisition modes have something to show without a microphone.

use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use super::source::{CaptureConfig, Chunk, ChunkReader, SampleSource};
use crate::scope::ScopeError;

const TONE_HZ: f64 = 440.0;
const BURST_AMPLITUDE: f64 = 8_000.0;
// Below the lowest trigger level, so quiet stretches are gated out.
const QUIET_AMPLITUDE: f64 = 8.0;
const BURST_PERIOD_SECS: f64 = 1.0;

pub struct SyntheticSource {
    /// Sleep so chunks arrive at the rate a real device would deliver them
    paced: bool,
}

impl SyntheticSource {
    pub fn new(paced: bool) -> Self {
        Self { paced }
    }
}

impl SampleSource for SyntheticSource {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn ChunkReader>, ScopeError> {
        if config.sample_rate == 0 || config.chunk_size == 0 {
            return Err(ScopeError::HardwareOpen(
                "sample rate and chunk size must be non-zero".to_string(),
            ));
        }
        tracing::debug!(
            "Synthetic source opened: {}Hz, {} samples per chunk",
            config.sample_rate,
            config.chunk_size
        );
        Ok(Box::new(SyntheticReader {
            config: *config,
            produced: 0,
            started: Instant::now(),
            paced: self.paced,
        }))
    }

    fn describe(&self) -> String {
        "synthetic".to_string()
    }
}

struct SyntheticReader {
    config: CaptureConfig,
    produced: u64,
    started: Instant,
    paced: bool,
}

impl SyntheticReader {
    fn sample_at(&self, index: u64) -> i16 {
        let rate = self.config.sample_rate as f64;
        let t = index as f64 / rate;
        let in_burst = (t % BURST_PERIOD_SECS) < BURST_PERIOD_SECS / 2.0;
        let amplitude = if in_burst {
            BURST_AMPLITUDE
        } else {
            QUIET_AMPLITUDE
        };
        (amplitude * (TAU * TONE_HZ * t).sin()).round() as i16
    }
}

impl ChunkReader for SyntheticReader {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn read(&mut self) -> Result<Chunk, ScopeError> {
        let start = self.produced;
        let chunk: Chunk = (start..start + self.config.chunk_size as u64)
            .map(|i| self.sample_at(i))
            .collect();
        self.produced += self.config.chunk_size as u64;

        if self.paced {
            let due = Duration::from_secs_f64(self.produced as f64 / self.config.sample_rate as f64);
            if let Some(wait) = due.checked_sub(self.started.elapsed()) {
                std::thread::sleep(wait);
            }
        }
        Ok(chunk)
    }

    fn close(self: Box<Self>) {
        tracing::debug!("Synthetic source closed after {} samples", self.produced);
    }
}
