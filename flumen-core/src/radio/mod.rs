//! Radio front-end abstraction and acquisition types.
//!
//! The concrete hardware driver lives outside this crate. The acquisition
//! pipeline only needs two narrow capabilities, split along the thread
//! boundary they are used on:
//!
//! - [`RadioSource`]: tuner control (open a stream, apply gain / rate /
//!   frequency). Stays with the controller on the control thread.
//! - [`SampleStream`]: "read up to N samples into this range". The stream
//!   handle moves into the producer thread and is the only device object the
//!   acquisition loop touches, so parameter changes never race the loop.

pub mod controller;
pub mod stub;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One interleaved complex baseband sample: 16-bit in-phase and quadrature
/// components (the `sc16` wire format common to SDR front-ends).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct IqSample {
    pub i: i16,
    pub q: i16,
}

/// Metadata stamped on every committed sample block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct BlockHeader {
    /// Capture timestamp, nanoseconds since the Unix epoch, taken when the
    /// block's slot was acquired.
    pub timestamp_ns: u64,
    /// Valid samples in the block. Equals the configured block length except
    /// for a final short block cut off by a device failure or end of stream.
    pub num_samples: u64,
    pub reserved: u64,
}

/// Nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Current wall-clock time. Saturates to zero before the epoch.
    pub fn now() -> Self {
        let ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self(ns)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }
}

/// Tuner settings held by the controller and applied to the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Complex sample rate in Hz.
    pub sample_rate_hz: f64,
    /// RF centre frequency in Hz.
    pub center_frequency_hz: f64,
    /// Front-end gain in dB.
    pub gain_db: f64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 2_048_000.0,
            center_frequency_hz: 100_000_000.0,
            gain_db: 0.0,
        }
    }
}

/// Block length selector for a stream: a fixed sample count, or a duration
/// converted at the configured sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SampleWindow {
    /// Exactly this many samples per block.
    Samples(usize),
    /// This many seconds of capture per block.
    Seconds(f64),
}

impl SampleWindow {
    /// Block length in samples at the given rate.
    pub fn num_samples(self, sample_rate_hz: f64) -> usize {
        match self {
            SampleWindow::Samples(n) => n,
            SampleWindow::Seconds(s) => (s * sample_rate_hz).round().max(0.0) as usize,
        }
    }
}

/// A live sample stream handle. Owned by the producer thread for the
/// duration of one `start_stream`/`stop_stream` cycle.
pub trait SampleStream: Send + 'static {
    /// Read up to `dst.len()` samples into `dst`, returning how many were
    /// actually written. May under-fill (the caller loops until its block is
    /// full); must never report more than it wrote. `Ok(0)` signals end of
    /// stream.
    ///
    /// # Errors
    /// A device-level read failure; the acquisition loop treats it as fatal
    /// to the stream.
    fn recv(&mut self, dst: &mut [IqSample]) -> Result<usize>;
}

/// Tuner control for a radio front-end.
pub trait RadioSource: Send {
    type Stream: SampleStream;

    /// Open a streaming handle at the given configuration.
    ///
    /// # Errors
    /// `FlumenError::Hardware` when the device cannot supply a stream.
    fn open_stream(&mut self, config: &RadioConfig) -> Result<Self::Stream>;

    /// Apply a gain change synchronously.
    fn apply_gain(&mut self, gain_db: f64) -> Result<()>;

    /// Apply a sample-rate change synchronously.
    fn apply_sample_rate(&mut self, rate_hz: f64) -> Result<()>;

    /// Apply a centre-frequency change synchronously.
    fn apply_center_frequency(&mut self, freq_hz: f64) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_window_converts_durations() {
        assert_eq!(SampleWindow::Samples(4096).num_samples(1e6), 4096);
        assert_eq!(SampleWindow::Seconds(0.5).num_samples(2_048_000.0), 1_024_000);
        assert_eq!(SampleWindow::Seconds(-1.0).num_samples(1e6), 0);
    }

    #[test]
    fn iq_sample_matches_wire_layout() {
        assert_eq!(std::mem::size_of::<IqSample>(), 4);
        assert_eq!(std::mem::align_of::<IqSample>(), 2);
    }
}
