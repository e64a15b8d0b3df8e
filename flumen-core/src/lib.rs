//! # flumen-core
//!
//! Real-time RF sample acquisition over a lock-free byte queue.
//!
//! ## Architecture
//!
//! ```text
//! RadioSource::open_stream → SampleStream ─┐  producer thread ("flumen-rx")
//!                                          │
//!                            FramedProducer<BlockHeader, IqSample>
//!                                          │
//!                              SPSC variable-slot byte ring
//!                                          │
//!                            FramedConsumer<BlockHeader, IqSample>
//!                                          │
//!                               caller thread (DSP / storage)
//! ```
//!
//! The producer thread never allocates after start-up: blocks are filled in
//! place inside leased ring slots and published with a single atomic store.
//! [`RadioRx`](radio::controller::RadioRx) owns the thread's lifecycle; the
//! queue layer ([`spsc_ring`], [`framed_ring`]) is usable on its own for any
//! single-producer single-consumer byte transport.

#![warn(clippy::all)]

pub mod error;
pub mod queue;
pub mod radio;

// Convenience re-exports for downstream crates
pub use error::{FlumenError, Result};
pub use queue::{framed_ring, spsc_ring, QueueError};
pub use radio::controller::{BlockConsumer, RadioRx};
pub use radio::{
    BlockHeader, IqSample, RadioConfig, RadioSource, SampleStream, SampleWindow, Timestamp,
};
