//! Single-producer byte ring buffer with a "flush contiguous region"
//! primitive (spec §4.2).
//!
//! Grounded on `examples/original_source/faraabin/faraabin_link_buffer.c`:
//! `head`/`tail`/`count`/`is_full` bookkeeping, overwrite-oldest on
//! overflow, and a flush that hands back the longest contiguous readable
//! run (never wrapping), consuming it logically on return.

use log::warn;

/// Fixed-capacity ring buffer of `N` bytes, backed by an array (no heap).
pub struct RingBuffer<const N: usize> {
    buf: [u8; N],
    head: usize,
    tail: usize,
    count: usize,
    full: bool,
    overflowed: bool,
}

impl<const N: usize> RingBuffer<N> {
    /// An empty ring buffer.
    pub const fn new() -> Self {
        Self {
            buf: [0u8; N],
            head: 0,
            tail: 0,
            count: 0,
            full: false,
            overflowed: false,
        }
    }

    /// Total capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of bytes currently queued.
    pub const fn len(&self) -> usize {
        self.count
    }

    /// `true` if no bytes are queued.
    pub const fn is_empty(&self) -> bool {
        !self.full && self.head == self.tail
    }

    /// `true` if the buffer is at capacity.
    pub const fn is_full(&self) -> bool {
        self.full
    }

    /// Latched since the last call to [`RingBuffer::clear_overflow`]:
    /// `true` if a `put` ever had to discard unread bytes.
    pub const fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Clears the latched overflow flag (host command
    /// `ClearFlagBufferOvf`, spec §4.9).
    pub fn clear_overflow(&mut self) {
        self.overflowed = false;
    }

    /// Appends `bytes`. Always succeeds; if the buffer is full, the
    /// oldest queued bytes are overwritten and [`RingBuffer::overflowed`]
    /// latches.
    pub fn put(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.buf[self.head] = b;
            if self.full {
                self.tail = (self.tail + 1) % N;
                self.overflowed = true;
                warn!("faraabin ring buffer overflow, oldest byte discarded");
            }
            self.head = (self.head + 1) % N;
            if self.count < N {
                self.count += 1;
            }
            self.full = self.head == self.tail;
        }
    }

    /// Appends a single byte. See [`RingBuffer::put`].
    pub fn put_one(&mut self, byte: u8) {
        self.put(core::slice::from_ref(&byte));
    }

    /// Returns a pointer to the longest contiguous readable run starting
    /// at `tail` (never wrapping past the end of the backing array), and
    /// logically consumes that run. Returns `None` if empty.
    pub fn flush_chunk(&mut self) -> Option<&[u8]> {
        if self.is_empty() {
            return None;
        }
        let run_len = if self.full {
            N - self.tail
        } else if self.head > self.tail {
            self.head - self.tail
        } else {
            N - self.tail
        };
        let start = self.tail;
        self.tail = (self.tail + run_len) % N;
        self.count -= run_len;
        self.full = false;
        Some(&self.buf[start..start + run_len])
    }

    /// Drops all queued bytes without reading them.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
        self.full = false;
    }

    /// RAM footprint of this buffer in bytes (spec §11 supplement).
    pub const fn ram_usage(&self) -> usize {
        core::mem::size_of::<Self>()
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> crate::wire::codec::EncodeSink for RingBuffer<N> {
    fn push(&mut self, byte: u8) {
        self.put_one(byte);
    }
}
