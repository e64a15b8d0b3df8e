//! `SignalGenerator` — synthetic front-end used when no hardware is present.
//!
//! Produces a deterministic sample ramp so consumers can verify block
//! continuity end-to-end. Per-call chunk limits emulate the partial reads
//! real drivers return, and optional pacing emulates hardware I/O latency.

use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::{FlumenError, Result};
use crate::radio::{IqSample, RadioConfig, RadioSource, SampleStream};

/// The deterministic sample at absolute stream position `index`: the low 16
/// bits of the position in `i`, the next 16 bits in `q`.
pub fn ramp_sample(index: u64) -> IqSample {
    IqSample {
        i: (index & 0xFFFF) as u16 as i16,
        q: ((index >> 16) & 0xFFFF) as u16 as i16,
    }
}

/// Synthetic radio front-end.
pub struct SignalGenerator {
    chunk_limit: usize,
    pacing: Option<Duration>,
    fail_open: bool,
    config: RadioConfig,
}

impl SignalGenerator {
    pub fn new() -> Self {
        Self {
            chunk_limit: 512,
            pacing: None,
            fail_open: false,
            config: RadioConfig::default(),
        }
    }

    /// Cap each `recv` call at `limit` samples, forcing the acquisition loop
    /// to assemble blocks from multiple partial reads.
    pub fn with_chunk_limit(mut self, limit: usize) -> Self {
        self.chunk_limit = limit.max(1);
        self
    }

    /// Sleep this long inside every `recv` call, emulating hardware latency.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// A generator whose `open_stream` always fails, for exercising the
    /// hardware-failure path.
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }

    /// Last applied configuration, for inspection in tests and demos.
    pub fn config(&self) -> RadioConfig {
        self.config
    }
}

impl Default for SignalGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioSource for SignalGenerator {
    type Stream = RampStream;

    fn open_stream(&mut self, config: &RadioConfig) -> Result<Self::Stream> {
        if self.fail_open {
            return Err(FlumenError::Hardware(
                "signal generator configured to fail".into(),
            ));
        }
        self.config = *config;
        debug!(
            sample_rate_hz = config.sample_rate_hz,
            chunk_limit = self.chunk_limit,
            "opening synthetic stream"
        );
        Ok(RampStream {
            position: 0,
            chunk_limit: self.chunk_limit,
            pacing: self.pacing,
        })
    }

    fn apply_gain(&mut self, gain_db: f64) -> Result<()> {
        self.config.gain_db = gain_db;
        Ok(())
    }

    fn apply_sample_rate(&mut self, rate_hz: f64) -> Result<()> {
        self.config.sample_rate_hz = rate_hz;
        Ok(())
    }

    fn apply_center_frequency(&mut self, freq_hz: f64) -> Result<()> {
        self.config.center_frequency_hz = freq_hz;
        Ok(())
    }
}

/// Stream handle yielding the deterministic ramp.
pub struct RampStream {
    position: u64,
    chunk_limit: usize,
    pacing: Option<Duration>,
}

impl SampleStream for RampStream {
    fn recv(&mut self, dst: &mut [IqSample]) -> Result<usize> {
        if let Some(pacing) = self.pacing {
            thread::sleep(pacing);
        }
        let n = dst.len().min(self.chunk_limit);
        for sample in &mut dst[..n] {
            *sample = ramp_sample(self.position);
            self.position += 1;
        }
        Ok(n)
    }
}
