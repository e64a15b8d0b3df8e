//! Lock-free variable-length SPSC byte queue.
//!
//! # Design constraints
//!
//! The producer side runs on the acquisition thread between hardware reads.
//! Its operations **must not**:
//! - Allocate heap memory (all storage is reserved at construction)
//! - Block on a mutex or condvar
//! - Spin waiting for the consumer
//!
//! `Full`, `Empty` and `TooBig` are therefore ordinary control returns, not
//! errors in the fatal sense — the caller decides whether to retry, drop, or
//! back off.
//!
//! # Slot layout
//!
//! ```text
//! ┌────────┬───────────────┬───┬────────┬───────────────────┬───┐
//! │ header │    payload    │pad│ header │      payload      │pad│ ...
//! └────────┴───────────────┴───┴────────┴───────────────────┴───┘
//!  each slot starts on a cache-line boundary; committed spans are
//!  rounded up to the next cache line so independently committed
//!  slots never share a line
//! ```
//!
//! A slot that would straddle the physical end of the ring is preceded by a
//! *padding* header describing the dead tail bytes; the real slot restarts at
//! offset 0. Padding is consumed transparently by the read side and never
//! surfaced as a payload.
//!
//! # Ordering contract
//!
//! Every cursor the *other* side consumes to make a decision is published
//! with `Release` and observed with `Acquire`; cursors a side only reads back
//! itself are `Relaxed`. All cursor accesses go through the named operations
//! on `RingStore` (`publish_write` / `observe_write` / ...), so the contract
//! is enforced in one place.

pub mod ring;
pub mod typed;

pub use ring::{spsc_ring, ReadSlot, SlotConsumer, SlotProducer, WriteSlot};
pub use typed::{framed_ring, FramedConsumer, FramedProducer, FramedReadSlot, FramedWriteSlot};

use thiserror::Error;

/// Slot alignment and committed-span rounding granularity, in bytes.
pub const CACHE_LINE: usize = 64;

/// Steady-state control returns from queue operations.
///
/// None of these is fatal: `Full`/`Empty` are transient backpressure and
/// underrun signals, `TooBig` means the request can never fit and the queue
/// must be constructed larger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Not enough free space for the requested slot right now.
    #[error("queue is full")]
    Full,
    /// No committed slot available to read.
    #[error("queue is empty")]
    Empty,
    /// The requested slot exceeds the queue's total capacity.
    #[error("requested slot exceeds queue capacity")]
    TooBig,
}
