//! Byte ring storage and the slot protocol.
//!
//! `RingStore` owns a fixed, cache-line-aligned allocation and two monotonic
//! cursors. `spsc_ring` splits it into a [`SlotProducer`] / [`SlotConsumer`]
//! pair; each half takes `&mut self` to acquire, so a second acquisition on
//! the same side is rejected at compile time until the outstanding slot guard
//! is gone. Dropping a guard commits it, so a lease can never be leaked
//! uncommitted.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use super::{QueueError, CACHE_LINE};

/// Header preceding every slot payload inside the ring.
///
/// For a padding slot, `size` is the number of dead bytes between this header
/// and the physical end of the buffer; the real header sits at offset 0.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct SlotHeader {
    size: usize,
    padded: bool,
}

/// Bytes occupied by a slot header. Header offsets are always cache-line
/// aligned, so the payload that follows is aligned to `HEADER_BYTES` itself
/// (a power of two on every supported target).
pub(crate) const HEADER_BYTES: usize = std::mem::size_of::<SlotHeader>();

pub(crate) const fn align_up(v: usize, align: usize) -> usize {
    (v + align - 1) & !(align - 1)
}

/// Full span a committed slot consumes in the ring: header + payload,
/// rounded up to the next cache-line boundary.
pub(crate) const fn slot_span(payload_len: usize) -> usize {
    align_up(HEADER_BYTES + payload_len, CACHE_LINE)
}

/// Fixed-capacity byte storage shared by the two queue halves.
///
/// Cursors are monotonic and never wrapped; the physical offset of an index
/// is `index & (capacity - 1)`. Invariant: `0 <= write - read <= capacity`.
pub(crate) struct RingStore {
    buf: *mut u8,
    capacity: usize,
    write_index: CachePadded<AtomicUsize>,
    read_index: CachePadded<AtomicUsize>,
}

// SAFETY: the raw buffer is exclusively owned by the ring; all cross-thread
// access to its contents is mediated by the acquire/release cursor protocol
// below, under the SPSC contract enforced by the split producer/consumer API.
unsafe impl Send for RingStore {}
unsafe impl Sync for RingStore {}

impl RingStore {
    fn with_capacity(requested: usize) -> Self {
        let capacity = requested
            .checked_next_power_of_two()
            .expect("ring capacity overflows a usize")
            .max(CACHE_LINE);
        let layout = Layout::from_size_align(capacity, CACHE_LINE)
            .expect("ring capacity overflows allocation layout");
        // Zeroed storage keeps every leased byte range initialised even
        // before its first write.
        let buf = unsafe { alloc_zeroed(layout) };
        if buf.is_null() {
            handle_alloc_error(layout);
        }
        Self {
            buf,
            capacity,
            write_index: CachePadded::new(AtomicUsize::new(0)),
            read_index: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    #[inline]
    fn mask(&self, index: usize) -> usize {
        index & (self.capacity - 1)
    }

    // ── Named cursor operations: the ordering contract lives here only ──

    /// Writer-published cursor, as seen by the reader.
    #[inline]
    fn observe_write(&self) -> usize {
        self.write_index.load(Ordering::Acquire)
    }

    /// Reader-published cursor, as seen by the writer.
    #[inline]
    fn observe_read(&self) -> usize {
        self.read_index.load(Ordering::Acquire)
    }

    /// Writer reading back its own cursor; no synchronisation needed.
    #[inline]
    fn local_write(&self) -> usize {
        self.write_index.load(Ordering::Relaxed)
    }

    /// Reader reading back its own cursor; no synchronisation needed.
    #[inline]
    fn local_read(&self) -> usize {
        self.read_index.load(Ordering::Relaxed)
    }

    /// Publish the write cursor; everything stored before this call
    /// happens-before a reader that observes the new value.
    #[inline]
    fn publish_write(&self, index: usize) {
        self.write_index.store(index, Ordering::Release);
    }

    /// Publish the read cursor; this is what visibly frees space for the
    /// writer.
    #[inline]
    fn publish_read(&self, index: usize) {
        self.read_index.store(index, Ordering::Release);
    }

    /// # Safety
    /// `offset` must be a cache-line-aligned offset at which this side is
    /// entitled to place a header (inside space it owns per the cursors).
    #[inline]
    unsafe fn write_header(&self, offset: usize, hdr: SlotHeader) {
        debug_assert!(offset % CACHE_LINE == 0 && offset + HEADER_BYTES <= self.capacity);
        ptr::write(self.buf.add(offset).cast::<SlotHeader>(), hdr);
    }

    /// # Safety
    /// `offset` must be a cache-line-aligned offset of a header previously
    /// written by the producer and published via the write cursor.
    #[inline]
    unsafe fn read_header(&self, offset: usize) -> SlotHeader {
        debug_assert!(offset % CACHE_LINE == 0 && offset + HEADER_BYTES <= self.capacity);
        ptr::read(self.buf.add(offset).cast::<SlotHeader>())
    }
}

impl Drop for RingStore {
    fn drop(&mut self) {
        // SAFETY: same size/alignment the buffer was allocated with.
        unsafe {
            dealloc(
                self.buf,
                Layout::from_size_align_unchecked(self.capacity, CACHE_LINE),
            );
        }
    }
}

/// Create a matched producer/consumer pair over a fresh ring.
///
/// The requested capacity is rounded up to the next power of two and to at
/// least one cache line; it is fixed for the life of the queue. Exactly one
/// thread may drive each half.
pub fn spsc_ring(capacity: usize) -> (SlotProducer, SlotConsumer) {
    let ring = Arc::new(RingStore::with_capacity(capacity));
    (
        SlotProducer {
            ring: Arc::clone(&ring),
        },
        SlotConsumer { ring },
    )
}

/// Write half of the queue. Owned by exactly one thread at a time.
pub struct SlotProducer {
    ring: Arc<RingStore>,
}

/// Read half of the queue. Owned by exactly one thread at a time.
pub struct SlotConsumer {
    ring: Arc<RingStore>,
}

impl SlotProducer {
    /// Lease a writable slot of exactly `size` payload bytes.
    ///
    /// Inserts a padding slot first when the request would straddle the
    /// physical end of the ring. The admission check accounts for the
    /// cache-line rounding applied at commit time *and* for any padding, so a
    /// successful acquire can never consume more ring space than was
    /// validated here.
    ///
    /// # Errors
    /// [`QueueError::TooBig`] if the rounded slot can never fit in this ring
    /// (regardless of occupancy); [`QueueError::Full`] if it does not fit
    /// right now.
    pub fn acquire(&mut self, size: usize) -> Result<WriteSlot<'_>, QueueError> {
        let ring = &*self.ring;
        // Checked before the span arithmetic so a near-usize::MAX request
        // cannot overflow it into a small, admissible value.
        if size >= ring.capacity {
            return Err(QueueError::TooBig);
        }
        let span = slot_span(size);
        // A span equal to the capacity would violate the one-byte slack rule
        // on every attempt, so it is permanently unplaceable.
        if span >= ring.capacity {
            return Err(QueueError::TooBig);
        }

        let read = ring.observe_read();
        let mut write = ring.local_write();
        let mut offset = ring.mask(write);

        let pad_span = if offset + span > ring.capacity {
            ring.capacity - offset
        } else {
            0
        };

        // Keep at least one byte of slack so the cursors are never
        // ambiguously equal-when-full vs equal-when-empty.
        if write - read + pad_span + span >= ring.capacity {
            return Err(QueueError::Full);
        }

        if pad_span > 0 {
            // SAFETY: `offset` is cache-line aligned (commits round spans to
            // cache lines, padding restarts at 0) and lies in space the
            // writer owns: the Full check above admitted `pad_span + span`.
            unsafe {
                ring.write_header(
                    offset,
                    SlotHeader {
                        size: pad_span - HEADER_BYTES,
                        padded: true,
                    },
                );
            }
            offset = 0;
            // SAFETY: offset 0 is aligned and owned by the writer.
            unsafe {
                ring.write_header(
                    offset,
                    SlotHeader {
                        size,
                        padded: false,
                    },
                );
            }
            // Both headers are written before the reader can observe the
            // advanced cursor, so it never sees a torn header.
            write += pad_span;
            ring.publish_write(write);
        } else {
            // SAFETY: as above; the slot header precedes any cursor advance
            // the reader could observe.
            unsafe {
                ring.write_header(
                    offset,
                    SlotHeader {
                        size,
                        padded: false,
                    },
                );
            }
        }

        // SAFETY: the payload range [offset + HEADER_BYTES, offset +
        // HEADER_BYTES + size) was admitted above and cannot overlap any
        // unread slot.
        let data = unsafe { ring.buf.add(offset + HEADER_BYTES) };
        Ok(WriteSlot {
            ring,
            data,
            len: size,
        })
    }

    /// Total ring capacity in bytes (after construction rounding).
    pub fn capacity(&self) -> usize {
        self.ring.capacity
    }
}

impl SlotConsumer {
    /// Lease the oldest committed slot, skipping any padding slot first.
    ///
    /// # Errors
    /// [`QueueError::Empty`] when no committed payload is available.
    pub fn acquire(&mut self) -> Result<ReadSlot<'_>, QueueError> {
        let ring = &*self.ring;
        let write = ring.observe_write();
        let mut read = ring.local_read();
        if read == write {
            return Err(QueueError::Empty);
        }

        let mut offset = ring.mask(read);
        // SAFETY: read < write, so a header at this offset was published by
        // the producer's release store we just observed.
        let mut hdr = unsafe { ring.read_header(offset) };

        if hdr.padded {
            read += hdr.size + HEADER_BYTES;
            ring.publish_read(read);
            // The padding may have been published ahead of the slot that
            // follows it; re-check before touching offset 0.
            if read == write {
                return Err(QueueError::Empty);
            }
            offset = 0;
            debug_assert_eq!(ring.mask(read), 0);
            // SAFETY: as above, now for the real header at offset 0.
            hdr = unsafe { ring.read_header(offset) };
        }
        debug_assert!(!hdr.padded);

        // SAFETY: the payload was fully written before the producer's
        // release publish, which we observed with acquire.
        let data = unsafe { ring.buf.add(offset + HEADER_BYTES) };
        Ok(ReadSlot {
            ring,
            data,
            len: hdr.size,
        })
    }

    /// Total ring capacity in bytes (after construction rounding).
    pub fn capacity(&self) -> usize {
        self.ring.capacity
    }

    /// `true` when no committed slot is currently readable.
    pub fn is_empty(&self) -> bool {
        self.ring.local_read() == self.ring.observe_write()
    }
}

/// Leased writable payload range. Dereferences to `&mut [u8]`.
///
/// Dropping the slot commits it: the write cursor advances past header and
/// payload, rounded to the next cache line, with release ordering. Holding
/// the slot borrows the producer, so only one write lease can exist at a
/// time.
pub struct WriteSlot<'a> {
    ring: &'a RingStore,
    data: *mut u8,
    len: usize,
}

impl WriteSlot<'_> {
    /// Payload length in bytes (exactly as requested).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Commit explicitly. Equivalent to dropping the slot; spelled out for
    /// call sites where the commit point matters.
    pub fn commit(self) {}
}

impl Deref for WriteSlot<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: `data..data+len` is the leased payload range, initialised
        // (zeroed at construction) and exclusively ours until commit.
        unsafe { slice::from_raw_parts(self.data, self.len) }
    }
}

impl DerefMut for WriteSlot<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `deref`; the lease is exclusive.
        unsafe { slice::from_raw_parts_mut(self.data, self.len) }
    }
}

impl Drop for WriteSlot<'_> {
    fn drop(&mut self) {
        let write = self.ring.local_write();
        self.ring.publish_write(write + slot_span(self.len));
    }
}

/// Leased readable payload range. Dereferences to `&[u8]`.
///
/// Dropping the slot commits the read: the read cursor advances by the same
/// rounded span the writer consumed, visibly freeing the space.
pub struct ReadSlot<'a> {
    ring: &'a RingStore,
    data: *const u8,
    len: usize,
}

impl ReadSlot<'_> {
    /// Payload length in bytes, as recorded by the writer.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Commit explicitly. Equivalent to dropping the slot.
    pub fn commit(self) {}
}

impl Deref for ReadSlot<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: the payload was fully written before the commit we
        // observed, and the writer cannot reclaim it until we publish.
        unsafe { slice::from_raw_parts(self.data, self.len) }
    }
}

impl Drop for ReadSlot<'_> {
    fn drop(&mut self) {
        let read = self.ring.local_read();
        self.ring.publish_read(read + slot_span(self.len));
    }
}
