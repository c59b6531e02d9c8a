//! Growable byte arena a [`crate::request::Request`] reads header and body
//! bytes into before parsing.
//!
//! The teacher crate's `first/buffer.rs` implements this as a raw-pointer
//! growable ring with manual `alloc`/`realloc`. This crate keeps that
//! module's read/write-cursor-plus-compaction shape but backs it with a
//! plain `Vec<u8>`: the lock-free, page-aligned allocation discipline the
//! raw-pointer version exists for is instead the job of a dedicated
//! `BufferPool` (a `MemoryPool`-style slab, grounded on
//! `examples/original_source/include/MemoryPool.h`), which this crate does
//! not need to hand-roll since `Vec<u8>`'s allocator already satisfies the
//! per-connection allocation pattern at the scale this core targets.

const DEFAULT_CAPACITY: usize = 4096;

/// A growable, contiguous byte buffer with independent read/write cursors.
#[derive(Debug)]
pub struct RequestBuffer {
    data: Vec<u8>,
    read_offset: usize,
    write_offset: usize,
    desired_capacity: usize,
}

impl Default for RequestBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RequestBuffer {
    /// Creates a buffer pre-allocated to `desired_capacity` bytes (one OS
    /// page by default, per spec.md §3 "Request buffer").
    pub fn new(desired_capacity: usize) -> Self {
        Self {
            data: vec![0u8; desired_capacity],
            read_offset: 0,
            write_offset: 0,
            desired_capacity,
        }
    }

    /// Bytes available to read.
    pub fn remaining(&self) -> usize {
        self.write_offset - self.read_offset
    }

    /// Capacity available for writing before a grow is needed.
    pub fn remaining_mut(&self) -> usize {
        self.data.len() - self.write_offset
    }

    /// The unread portion of the buffer.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.read_offset..self.write_offset]
    }

    /// The writable tail of the buffer, growing it first if it has no spare
    /// capacity at all.
    pub fn writable_mut(&mut self) -> &mut [u8] {
        if self.remaining_mut() == 0 {
            self.grow();
        }
        &mut self.data[self.write_offset..]
    }

    /// Marks `amount` bytes consumed from the front, compacting when the
    /// buffer has drained back to empty.
    pub fn mark_read(&mut self, amount: usize) {
        self.read_offset = self.write_offset.min(self.read_offset + amount);
        self.compact();
    }

    /// Marks `amount` bytes written at the tail.
    pub fn mark_written(&mut self, amount: usize) {
        self.write_offset = self.data.len().min(self.write_offset + amount);
    }

    /// Resets to an empty buffer, shrinking back to `desired_capacity` if it
    /// had grown beyond it.
    pub fn clear(&mut self) {
        self.read_offset = 0;
        self.write_offset = 0;
        if self.data.len() > self.desired_capacity {
            self.data.truncate(self.desired_capacity);
            self.data.shrink_to_fit();
        }
    }

    fn grow(&mut self) {
        let new_len = if self.data.is_empty() {
            self.desired_capacity.max(1)
        } else {
            self.data.len() * 2
        };
        self.data.resize(new_len, 0);
    }

    fn compact(&mut self) {
        if self.remaining() == 0 {
            self.clear();
            return;
        }
        if self.read_offset > self.desired_capacity {
            self.data.copy_within(self.read_offset..self.write_offset, 0);
            self.write_offset = self.remaining();
            self.read_offset = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut buf = RequestBuffer::new(16);
        let slice = buf.writable_mut();
        slice[..5].copy_from_slice(b"hello");
        buf.mark_written(5);
        assert_eq!(buf.readable(), b"hello");
        buf.mark_read(5);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut buf = RequestBuffer::new(4);
        let payload = b"this is longer than four bytes";
        let mut written = 0;
        while written < payload.len() {
            let space = buf.writable_mut();
            let n = space.len().min(payload.len() - written);
            space[..n].copy_from_slice(&payload[written..written + n]);
            buf.mark_written(n);
            written += n;
        }
        assert_eq!(buf.readable(), &payload[..]);
    }

    #[test]
    fn compacts_after_full_drain() {
        let mut buf = RequestBuffer::new(8);
        buf.writable_mut()[..8].copy_from_slice(b"12345678");
        buf.mark_written(8);
        buf.mark_read(8);
        assert_eq!(buf.remaining(), 0);
        assert_eq!(buf.remaining_mut(), 8);
    }
}
