//! Typed overlay: `{header, [element]}` framing over the raw byte queue.
//!
//! A framed slot reinterprets one leased byte range as a fixed header `H`
//! followed by a `[T]` element array. No bytes are copied — only pointer
//! arithmetic over the lease. This is the only place the raw queue's opaque
//! bytes gain a type, and both halves of a stream are minted together by
//! [`framed_ring`], so they always agree on `(H, T)`.
//!
//! # Type requirements
//!
//! `H` and `T` must be plain-old-data records: `#[repr(C)]`, `Copy`, and
//! valid for any bit pattern (integer/sample structs such as
//! [`IqSample`](crate::radio::IqSample), never references, `bool`s or Rust
//! enums). The slot memory is reused across ring laps, so element references
//! observe whatever bytes a previous lap left behind until they are
//! overwritten.

use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::slice;

use super::ring::{spsc_ring, ReadSlot, SlotConsumer, SlotProducer, WriteSlot, HEADER_BYTES};
use super::QueueError;

/// Create a matched framed producer/consumer pair over a fresh ring of at
/// least `capacity` bytes.
///
/// # Panics
/// Panics at construction when `H` or `T` demand stricter alignment than the
/// slot layout guarantees (headers land on cache lines, payloads
/// `HEADER_BYTES` past them).
pub fn framed_ring<H: Copy, T: Copy>(capacity: usize) -> (FramedProducer<H, T>, FramedConsumer<H, T>) {
    assert!(
        HEADER_BYTES % mem::align_of::<H>() == 0,
        "frame header alignment exceeds slot payload alignment"
    );
    assert!(
        (HEADER_BYTES + mem::size_of::<H>()) % mem::align_of::<T>() == 0,
        "element alignment incompatible with frame header size"
    );

    let (raw_tx, raw_rx) = spsc_ring(capacity);
    (
        FramedProducer {
            raw: raw_tx,
            _frame: PhantomData,
        },
        FramedConsumer {
            raw: raw_rx,
            _frame: PhantomData,
        },
    )
}

/// Byte size of one frame of `count` elements, or `None` when the element
/// count does not even fit a usize of bytes.
pub(crate) fn frame_bytes<H, T>(count: usize) -> Option<usize> {
    mem::size_of::<T>()
        .checked_mul(count)?
        .checked_add(mem::size_of::<H>())
}

/// Write half of a framed ring.
pub struct FramedProducer<H, T> {
    raw: SlotProducer,
    _frame: PhantomData<(H, T)>,
}

/// Read half of a framed ring.
pub struct FramedConsumer<H, T> {
    raw: SlotConsumer,
    _frame: PhantomData<(H, T)>,
}

impl<H, T> std::fmt::Debug for FramedConsumer<H, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedConsumer").finish_non_exhaustive()
    }
}

impl<H: Copy, T: Copy> FramedProducer<H, T> {
    /// Lease a writable frame of `count` elements.
    ///
    /// # Errors
    /// Propagates [`QueueError::Full`] / [`QueueError::TooBig`] from the
    /// underlying byte queue; a count whose byte size overflows a `usize` is
    /// `TooBig` as well.
    pub fn acquire(&mut self, count: usize) -> Result<FramedWriteSlot<'_, H, T>, QueueError> {
        let bytes = frame_bytes::<H, T>(count).ok_or(QueueError::TooBig)?;
        let slot = self.raw.acquire(bytes)?;
        Ok(FramedWriteSlot {
            slot,
            count,
            _frame: PhantomData,
        })
    }

    /// Total ring capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }
}

impl<H: Copy, T: Copy> FramedConsumer<H, T> {
    /// Lease the oldest committed frame.
    ///
    /// # Errors
    /// [`QueueError::Empty`] when no committed frame is available.
    pub fn acquire(&mut self) -> Result<FramedReadSlot<'_, H, T>, QueueError> {
        let slot = self.raw.acquire()?;
        debug_assert!(slot.len() >= mem::size_of::<H>());
        let count = (slot.len() - mem::size_of::<H>()) / mem::size_of::<T>();
        Ok(FramedReadSlot {
            slot,
            count,
            _frame: PhantomData,
        })
    }

    /// Total ring capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// `true` when no committed frame is currently readable.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Leased writable frame: header slot plus `count` elements.
///
/// Dropping (or [`commit`](Self::commit)-ing) publishes the frame.
pub struct FramedWriteSlot<'a, H, T> {
    slot: WriteSlot<'a>,
    count: usize,
    _frame: PhantomData<(H, T)>,
}

impl<H: Copy, T: Copy> FramedWriteSlot<'_, H, T> {
    /// Number of elements in this frame.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Store the frame header. May be called more than once; the last value
    /// before commit wins.
    pub fn set_header(&mut self, header: H) {
        // SAFETY: the lease starts with `size_of::<H>()` bytes reserved for
        // the header; alignment was checked at ring construction.
        unsafe { ptr::write(self.slot.as_mut_ptr().cast::<H>(), header) }
    }

    /// Read back the current header bytes.
    pub fn header(&self) -> H {
        // SAFETY: as in `set_header`; H is valid for any bit pattern.
        unsafe { ptr::read(self.slot.as_ptr().cast::<H>()) }
    }

    /// The element array to fill.
    pub fn elements_mut(&mut self) -> &mut [T] {
        // SAFETY: the lease holds exactly `count` elements past the header;
        // alignment was checked at ring construction and T is valid for any
        // bit pattern.
        unsafe {
            slice::from_raw_parts_mut(
                self.slot.as_mut_ptr().add(mem::size_of::<H>()).cast::<T>(),
                self.count,
            )
        }
    }

    /// Commit explicitly. Equivalent to dropping the slot.
    pub fn commit(self) {}
}

/// Leased readable frame: header plus `count` elements.
///
/// Dropping (or [`commit`](Self::commit)-ing) frees the frame's ring space.
pub struct FramedReadSlot<'a, H, T> {
    slot: ReadSlot<'a>,
    count: usize,
    _frame: PhantomData<(H, T)>,
}

impl<H: Copy, T: Copy> FramedReadSlot<'_, H, T> {
    /// Number of elements in this frame.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The frame header as stamped by the producer.
    pub fn header(&self) -> H {
        // SAFETY: the committed frame starts with a header written by the
        // producer; visibility is guaranteed by the cursor protocol.
        unsafe { ptr::read(self.slot.as_ptr().cast::<H>()) }
    }

    /// The element array to consume.
    pub fn elements(&self) -> &[T] {
        // SAFETY: `count` elements were leased past the header and fully
        // written before the commit we observed.
        unsafe {
            slice::from_raw_parts(
                self.slot.as_ptr().add(mem::size_of::<H>()).cast::<T>(),
                self.count,
            )
        }
    }

    /// Commit explicitly. Equivalent to dropping the slot.
    pub fn commit(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::{BlockHeader, IqSample};

    #[test]
    fn framed_round_trip_preserves_header_and_elements() {
        let (mut tx, mut rx) = framed_ring::<BlockHeader, IqSample>(4096);

        {
            let mut slot = tx.acquire(64).expect("frame fits");
            slot.set_header(BlockHeader {
                timestamp_ns: 42,
                num_samples: 64,
                reserved: 0,
            });
            for (k, s) in slot.elements_mut().iter_mut().enumerate() {
                *s = IqSample {
                    i: k as i16,
                    q: -(k as i16),
                };
            }
            slot.commit();
        }

        let slot = rx.acquire().expect("frame readable");
        assert_eq!(slot.len(), 64);
        let hdr = slot.header();
        assert_eq!(hdr.timestamp_ns, 42);
        assert_eq!(hdr.num_samples, 64);
        for (k, s) in slot.elements().iter().enumerate() {
            assert_eq!(*s, IqSample {
                i: k as i16,
                q: -(k as i16),
            });
        }
        slot.commit();
        assert!(rx.is_empty());
    }

    #[test]
    fn header_only_frame_is_valid() {
        let (mut tx, mut rx) = framed_ring::<BlockHeader, IqSample>(256);

        let mut slot = tx.acquire(0).expect("header-only frame");
        assert!(slot.is_empty());
        slot.set_header(BlockHeader {
            timestamp_ns: 7,
            num_samples: 0,
            reserved: 0,
        });
        slot.commit();

        let slot = rx.acquire().expect("readable");
        assert_eq!(slot.len(), 0);
        assert_eq!(slot.header().timestamp_ns, 7);
    }

    #[test]
    fn frames_are_delivered_in_fifo_order() {
        let (mut tx, mut rx) = framed_ring::<BlockHeader, IqSample>(8192);

        for n in 0..10u64 {
            let mut slot = tx.acquire(16).expect("frame fits");
            slot.set_header(BlockHeader {
                timestamp_ns: n,
                num_samples: 16,
                reserved: 0,
            });
            slot.elements_mut().fill(IqSample {
                i: n as i16,
                q: n as i16,
            });
            slot.commit();
        }

        for n in 0..10u64 {
            let slot = rx.acquire().expect("frame readable");
            assert_eq!(slot.header().timestamp_ns, n);
            assert!(slot.elements().iter().all(|s| s.i == n as i16));
            slot.commit();
        }
    }

    #[test]
    fn element_count_overflow_is_too_big() {
        let (mut tx, _rx) = framed_ring::<BlockHeader, IqSample>(1024);
        assert_eq!(tx.acquire(usize::MAX / 2).err(), Some(QueueError::TooBig));
        assert_eq!(tx.acquire(usize::MAX).err(), Some(QueueError::TooBig));
    }

    #[test]
    #[should_panic(expected = "frame header alignment")]
    fn over_aligned_header_is_rejected_at_construction() {
        #[derive(Clone, Copy)]
        #[repr(C, align(32))]
        struct Wide {
            _pad: [u8; 32],
        }

        let _ = framed_ring::<Wide, IqSample>(1024);
    }
}
