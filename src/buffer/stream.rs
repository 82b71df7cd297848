//! Drainable ring buffer
//!
//! Fixed-capacity byte ring with the same drop-oldest append as
//! [`super::RingBuffer`], plus consuming reads. Audio streams append from
//! their device callbacks and the mixer drains one chunk per pass; the clip
//! saver snapshots the mixed ring without disturbing the drain cursor.

use parking_lot::Mutex;

struct Inner {
    data: Vec<u8>,
    /// Absolute write position; grows monotonically.
    head: u64,
    /// Absolute read position; `head - tail` is the buffered byte count.
    tail: u64,
}

/// Fixed-capacity ring with drop-oldest overwrite, consuming reads and
/// non-consuming snapshots.
pub struct StreamBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl StreamBuffer {
    /// Create a ring holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be at least 1 byte");
        Self {
            inner: Mutex::new(Inner {
                data: vec![0; capacity],
                head: 0,
                tail: 0,
            }),
            capacity,
        }
    }

    /// Append bytes, dropping the oldest unread data once the ring is full.
    ///
    /// A payload larger than the capacity keeps only its trailing
    /// `capacity` bytes. Never blocks the caller; safe from a real-time
    /// audio callback.
    pub fn append(&self, mut p: &[u8]) {
        if p.len() > self.capacity {
            p = &p[p.len() - self.capacity..];
        }

        let mut inner = self.inner.lock();
        let n = p.len() as u64;

        let free = self.capacity as u64 - (inner.head - inner.tail);
        if free < n {
            inner.tail += n - free;
        }

        let start = (inner.head % self.capacity as u64) as usize;
        let first = p.len().min(self.capacity - start);
        inner.data[start..start + first].copy_from_slice(&p[..first]);
        inner.data[..p.len() - first].copy_from_slice(&p[first..]);
        inner.head += n;
    }

    /// Consume up to `out.len()` bytes into `out`, returning how many were
    /// read. Never blocks; returns 0 when the ring is empty.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let mut inner = self.inner.lock();
        let available = (inner.head - inner.tail) as usize;
        let n = out.len().min(available);
        if n == 0 {
            return 0;
        }

        let start = (inner.tail % self.capacity as u64) as usize;
        let first = n.min(self.capacity - start);
        out[..first].copy_from_slice(&inner.data[start..start + first]);
        out[first..n].copy_from_slice(&inner.data[..n - first]);
        inner.tail += n as u64;
        n
    }

    /// Copy out the unread contents, oldest byte first, without consuming.
    pub fn snapshot(&self) -> Vec<u8> {
        let inner = self.inner.lock();
        let available = (inner.head - inner.tail) as usize;
        if available == 0 {
            return Vec::new();
        }

        let start = (inner.tail % self.capacity as u64) as usize;
        let first = available.min(self.capacity - start);
        let mut snap = Vec::with_capacity(available);
        snap.extend_from_slice(&inner.data[start..start + first]);
        snap.extend_from_slice(&inner.data[..available - first]);
        snap
    }

    /// Number of unread bytes currently held.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        (inner.head - inner.tail) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Logically discard all unread contents.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.tail = inner.head;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_consumes_in_order() {
        let buf = StreamBuffer::new(16);
        buf.append(b"abcdef");

        let mut out = [0u8; 4];
        assert_eq!(buf.read(&mut out), 4);
        assert_eq!(&out, b"abcd");
        assert_eq!(buf.len(), 2);

        assert_eq!(buf.read(&mut out), 2);
        assert_eq!(&out[..2], b"ef");
        assert_eq!(buf.read(&mut out), 0);
    }

    #[test]
    fn overflow_drops_oldest_unread() {
        let buf = StreamBuffer::new(8);
        buf.append(b"01234567");
        buf.append(b"ab");

        assert_eq!(buf.len(), 8);
        assert_eq!(buf.snapshot(), b"234567ab");
    }

    #[test]
    fn oversize_append_keeps_tail() {
        let buf = StreamBuffer::new(4);
        buf.append(b"0123456789");
        assert_eq!(buf.snapshot(), b"6789");
    }

    #[test]
    fn snapshot_leaves_drain_cursor_alone() {
        let buf = StreamBuffer::new(16);
        buf.append(b"abcdef");

        assert_eq!(buf.snapshot(), b"abcdef");
        let mut out = [0u8; 16];
        assert_eq!(buf.read(&mut out), 6);
        assert_eq!(&out[..6], b"abcdef");
    }

    #[test]
    fn wraps_across_the_boundary() {
        let buf = StreamBuffer::new(8);
        buf.append(b"abcdef");
        let mut out = [0u8; 4];
        assert_eq!(buf.read(&mut out), 4);

        // Head is at 6, writing 5 bytes wraps past the end.
        buf.append(b"ghijk");
        assert_eq!(buf.len(), 7);
        assert_eq!(buf.snapshot(), b"efghijk");
    }

    #[test]
    fn clear_discards_unread_bytes() {
        let buf = StreamBuffer::new(8);
        buf.append(b"abcd");
        buf.clear();
        assert_eq!(buf.len(), 0);

        buf.append(b"xy");
        assert_eq!(buf.snapshot(), b"xy");
    }
}
