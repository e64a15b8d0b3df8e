//! `RadioRx` — acquisition lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! RadioRx::new(source, config)
//!     └─► start_stream(window)  → device stream opened, producer thread
//!     │                           spawned, FramedConsumer returned
//!     └─► stop_stream()         → stop flag set, thread joined, Idle again
//! ```
//!
//! `start_stream` while streaming first stops the current stream (joining
//! its thread) so two producer threads can never drive one ring.
//! `stop_stream` while idle is a no-op.
//!
//! ## Threading
//!
//! The device stream handle and the ring's producer half move into the
//! acquisition thread; the tuner and configuration stay on the control side
//! behind a `parking_lot::Mutex`. Gain/rate/frequency setters may therefore
//! be called during an active stream without racing the loop — only the
//! stream handle is touched there.
//!
//! The stop flag is sampled once per block, so `stop_stream` blocks for at
//! most the time it takes the device to fill the remainder of the current
//! block (plus the join itself).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{FlumenError, Result};
use crate::queue::typed::{framed_ring, frame_bytes, FramedConsumer, FramedProducer};
use crate::queue::CACHE_LINE;
use crate::radio::{
    BlockHeader, IqSample, RadioConfig, RadioSource, SampleStream, SampleWindow, Timestamp,
};

/// Ring sizing: how many whole blocks the queue holds, to tolerate consumer
/// jitter before the producer sees backpressure.
const RING_BLOCKS: usize = 4;

/// The consumer handle returned by [`RadioRx::start_stream`].
pub type BlockConsumer = FramedConsumer<BlockHeader, IqSample>;

type BlockProducer = FramedProducer<BlockHeader, IqSample>;

/// Acquisition controller over a radio front-end.
///
/// Owns the tuner, the held configuration, and the producer thread's
/// lifecycle. At most one stream is active at a time.
pub struct RadioRx<S: RadioSource> {
    source: Mutex<S>,
    config: Mutex<RadioConfig>,
    streaming: AtomicBool,
    stop: Arc<AtomicBool>,
    rx_thread: Option<JoinHandle<()>>,
}

impl<S: RadioSource> RadioRx<S> {
    /// Create an idle controller. No device interaction happens until
    /// `start_stream`.
    pub fn new(source: S, config: RadioConfig) -> Self {
        Self {
            source: Mutex::new(source),
            config: Mutex::new(config),
            streaming: AtomicBool::new(false),
            stop: Arc::new(AtomicBool::new(false)),
            rx_thread: None,
        }
    }

    /// Start streaming blocks of `window` samples into a fresh ring.
    ///
    /// An active stream is stopped (and its thread joined) first. On success
    /// the returned [`BlockConsumer`] is the single read handle for this
    /// stream; on failure the controller remains idle and no thread was
    /// spawned.
    ///
    /// # Errors
    /// `FlumenError::Hardware` when the device cannot supply a stream,
    /// `FlumenError::InvalidConfig` for an empty block length.
    pub fn start_stream(&mut self, window: SampleWindow) -> Result<BlockConsumer> {
        if self.is_streaming() {
            warn!("start_stream while streaming — restarting");
            self.stop_stream();
        }

        let config = *self.config.lock();
        let block_len = window.num_samples(config.sample_rate_hz);
        if block_len == 0 {
            return Err(FlumenError::InvalidConfig(
                "stream window resolves to an empty block".into(),
            ));
        }

        // Per-block slack covers the slot header and cache-line rounding, so
        // the ring genuinely holds RING_BLOCKS whole blocks after the
        // power-of-two round-up. Checked arithmetic: a Seconds window can
        // resolve to a block length no ring can represent.
        let capacity = frame_bytes::<BlockHeader, IqSample>(block_len)
            .and_then(|frame| frame.checked_add(2 * CACHE_LINE))
            .and_then(|block| block.checked_mul(RING_BLOCKS))
            .ok_or_else(|| {
                FlumenError::InvalidConfig("stream window is too large for a sample ring".into())
            })?;

        let stream = self.source.lock().open_stream(&config)?;
        let (producer, consumer) = framed_ring::<BlockHeader, IqSample>(capacity);

        self.stop.store(false, Ordering::Release);
        let stop = Arc::clone(&self.stop);
        let handle = thread::Builder::new()
            .name("flumen-rx".into())
            .spawn(move || rx_loop(stream, producer, stop, block_len))
            .map_err(FlumenError::Io)?;

        self.rx_thread = Some(handle);
        self.streaming.store(true, Ordering::Release);
        info!(
            block_len,
            ring_capacity = consumer.capacity(),
            sample_rate_hz = config.sample_rate_hz,
            "stream started"
        );
        Ok(consumer)
    }

    /// Stop the active stream, blocking until the producer thread has fully
    /// exited. A no-op when not streaming.
    pub fn stop_stream(&mut self) {
        if !self.streaming.load(Ordering::Acquire) {
            return;
        }
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.rx_thread.take() {
            if handle.join().is_err() {
                error!("acquisition thread panicked");
            }
        }
        self.streaming.store(false, Ordering::Release);
        self.stop.store(false, Ordering::Release);
        info!("stream stopped");
    }

    /// `true` between a successful `start_stream` and the matching
    /// `stop_stream`.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Snapshot of the held configuration.
    pub fn config(&self) -> RadioConfig {
        *self.config.lock()
    }

    pub fn get_gain(&self) -> f64 {
        self.config.lock().gain_db
    }

    pub fn get_sample_rate(&self) -> f64 {
        self.config.lock().sample_rate_hz
    }

    pub fn get_center_frequency(&self) -> f64 {
        self.config.lock().center_frequency_hz
    }

    /// Apply a gain change to the device and record it. Allowed while
    /// streaming; returns the application timestamp.
    pub fn set_gain(&self, gain_db: f64) -> Result<Timestamp> {
        self.source.lock().apply_gain(gain_db)?;
        self.config.lock().gain_db = gain_db;
        Ok(Timestamp::now())
    }

    /// Apply a sample-rate change to the device and record it. Note that an
    /// active stream keeps its block length; restart the stream for the new
    /// rate to affect block sizing.
    pub fn set_sample_rate(&self, rate_hz: f64) -> Result<Timestamp> {
        self.source.lock().apply_sample_rate(rate_hz)?;
        self.config.lock().sample_rate_hz = rate_hz;
        Ok(Timestamp::now())
    }

    /// Apply a centre-frequency change to the device and record it.
    pub fn set_center_frequency(&self, freq_hz: f64) -> Result<Timestamp> {
        self.source.lock().apply_center_frequency(freq_hz)?;
        self.config.lock().center_frequency_hz = freq_hz;
        Ok(Timestamp::now())
    }

    /// Apply a full configuration, touching the device only for fields that
    /// actually changed, then store the new configuration.
    pub fn set_configuration(&self, config: RadioConfig) -> Result<Timestamp> {
        let current = *self.config.lock();
        if config.sample_rate_hz != current.sample_rate_hz {
            self.set_sample_rate(config.sample_rate_hz)?;
        }
        if config.center_frequency_hz != current.center_frequency_hz {
            self.set_center_frequency(config.center_frequency_hz)?;
        }
        if config.gain_db != current.gain_db {
            self.set_gain(config.gain_db)?;
        }
        *self.config.lock() = config;
        Ok(Timestamp::now())
    }
}

impl<S: RadioSource> Drop for RadioRx<S> {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

/// Producer loop: one committed frame per filled block, until the stop flag
/// is observed or the stream ends.
///
/// Backpressure policy is fail-stop: a full ring means the consumer has
/// fallen RING_BLOCKS behind, and retrying would only burn the core the
/// consumer needs — the loop exits and waits to be joined.
fn rx_loop<D: SampleStream>(
    mut stream: D,
    mut producer: BlockProducer,
    stop: Arc<AtomicBool>,
    block_len: usize,
) {
    debug!(block_len, "acquisition loop started");
    let mut blocks: u64 = 0;

    while !stop.load(Ordering::Acquire) {
        let mut slot = match producer.acquire(block_len) {
            Ok(slot) => slot,
            Err(e) => {
                warn!(blocks, error = %e, "ring backpressure — stopping producer");
                break;
            }
        };

        let stamp = Timestamp::now();
        let mut filled = 0usize;
        let mut stream_over = false;
        while filled < block_len {
            match stream.recv(&mut slot.elements_mut()[filled..]) {
                Ok(0) => {
                    info!(blocks, filled, "sample stream ended");
                    stream_over = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) => {
                    error!(blocks, error = %e, "device read failed — stopping producer");
                    stream_over = true;
                    break;
                }
            }
        }

        slot.set_header(BlockHeader {
            timestamp_ns: stamp.as_nanos(),
            num_samples: filled as u64,
            reserved: 0,
        });
        slot.commit();
        blocks += 1;

        if stream_over {
            break;
        }
    }

    debug!(blocks, "acquisition loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::stub::{ramp_sample, SignalGenerator};

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingSource {
        inner: SignalGenerator,
        gain_calls: Arc<AtomicUsize>,
        rate_calls: Arc<AtomicUsize>,
        freq_calls: Arc<AtomicUsize>,
    }

    impl CountingSource {
        fn new() -> (Self, [Arc<AtomicUsize>; 3]) {
            let counters = [
                Arc::new(AtomicUsize::new(0)),
                Arc::new(AtomicUsize::new(0)),
                Arc::new(AtomicUsize::new(0)),
            ];
            (
                Self {
                    inner: SignalGenerator::new(),
                    gain_calls: Arc::clone(&counters[0]),
                    rate_calls: Arc::clone(&counters[1]),
                    freq_calls: Arc::clone(&counters[2]),
                },
                counters,
            )
        }
    }

    impl RadioSource for CountingSource {
        type Stream = <SignalGenerator as RadioSource>::Stream;

        fn open_stream(&mut self, config: &RadioConfig) -> Result<Self::Stream> {
            self.inner.open_stream(config)
        }

        fn apply_gain(&mut self, gain_db: f64) -> Result<()> {
            self.gain_calls.fetch_add(1, Ordering::Relaxed);
            self.inner.apply_gain(gain_db)
        }

        fn apply_sample_rate(&mut self, rate_hz: f64) -> Result<()> {
            self.rate_calls.fetch_add(1, Ordering::Relaxed);
            self.inner.apply_sample_rate(rate_hz)
        }

        fn apply_center_frequency(&mut self, freq_hz: f64) -> Result<()> {
            self.freq_calls.fetch_add(1, Ordering::Relaxed);
            self.inner.apply_center_frequency(freq_hz)
        }
    }

    #[test]
    fn hardware_failure_leaves_controller_idle() {
        let mut rx = RadioRx::new(SignalGenerator::failing(), RadioConfig::default());
        let err = rx
            .start_stream(SampleWindow::Samples(1024))
            .expect_err("failing device cannot stream");
        assert!(matches!(err, FlumenError::Hardware(_)));
        assert!(!rx.is_streaming());
    }

    #[test]
    fn empty_window_is_rejected() {
        let mut rx = RadioRx::new(SignalGenerator::new(), RadioConfig::default());
        let err = rx
            .start_stream(SampleWindow::Samples(0))
            .expect_err("empty block length");
        assert!(matches!(err, FlumenError::InvalidConfig(_)));
        assert!(!rx.is_streaming());
    }

    #[test]
    fn oversized_window_is_rejected() {
        let mut rx = RadioRx::new(SignalGenerator::new(), RadioConfig::default());
        let err = rx
            .start_stream(SampleWindow::Seconds(f64::MAX))
            .expect_err("window cannot be ring-sized");
        assert!(matches!(err, FlumenError::InvalidConfig(_)));
        assert!(!rx.is_streaming());
    }

    #[test]
    fn stop_stream_is_idempotent() {
        let mut rx = RadioRx::new(SignalGenerator::new(), RadioConfig::default());
        rx.stop_stream();
        rx.stop_stream();
        assert!(!rx.is_streaming());

        let consumer = rx
            .start_stream(SampleWindow::Samples(256))
            .expect("stream starts");
        assert!(rx.is_streaming());
        rx.stop_stream();
        assert!(!rx.is_streaming());
        rx.stop_stream();
        drop(consumer);
    }

    #[test]
    fn streamed_blocks_carry_the_generator_ramp() {
        let mut rx = RadioRx::new(
            SignalGenerator::new()
                .with_chunk_limit(100)
                .with_pacing(Duration::from_micros(200)),
            RadioConfig::default(),
        );
        let mut consumer = rx
            .start_stream(SampleWindow::Samples(256))
            .expect("stream starts");

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut position: u64 = 0;
        let mut blocks = 0;
        while blocks < 3 {
            match consumer.acquire() {
                Ok(slot) => {
                    let hdr = slot.header();
                    assert_eq!(hdr.num_samples, 256);
                    assert!(hdr.timestamp_ns > 0);
                    for sample in slot.elements() {
                        assert_eq!(*sample, ramp_sample(position));
                        position += 1;
                    }
                    slot.commit();
                    blocks += 1;
                }
                Err(_) => {
                    assert!(std::time::Instant::now() < deadline, "no blocks arrived");
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
        rx.stop_stream();
    }

    #[test]
    fn setters_touch_device_and_update_config() {
        let (source, [gain, rate, freq]) = CountingSource::new();
        let rx = RadioRx::new(source, RadioConfig::default());

        rx.set_gain(12.5).expect("gain applies");
        assert_eq!(rx.get_gain(), 12.5);
        assert_eq!(gain.load(Ordering::Relaxed), 1);

        rx.set_sample_rate(1e6).expect("rate applies");
        assert_eq!(rx.get_sample_rate(), 1e6);
        assert_eq!(rate.load(Ordering::Relaxed), 1);

        rx.set_center_frequency(433.92e6).expect("frequency applies");
        assert_eq!(rx.get_center_frequency(), 433.92e6);
        assert_eq!(freq.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn set_configuration_applies_only_changed_fields() {
        let (source, [gain, rate, freq]) = CountingSource::new();
        let rx = RadioRx::new(source, RadioConfig::default());

        let mut config = rx.config();
        config.gain_db += 6.0;
        rx.set_configuration(config).expect("config applies");

        assert_eq!(gain.load(Ordering::Relaxed), 1);
        assert_eq!(rate.load(Ordering::Relaxed), 0);
        assert_eq!(freq.load(Ordering::Relaxed), 0);
        assert_eq!(rx.config(), config);

        // Re-applying the identical configuration touches nothing.
        rx.set_configuration(config).expect("no-op config");
        assert_eq!(gain.load(Ordering::Relaxed), 1);
    }
}
