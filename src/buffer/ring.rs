//! Snapshot ring buffer
//!
//! Fixed-capacity byte ring fed by the video pump. Appends never fail: once
//! the ring is full the oldest bytes are overwritten. Readers take
//! non-consuming snapshots of the whole window.

use parking_lot::Mutex;

struct Inner {
    data: Vec<u8>,
    /// Next write position. Only meaningful modulo the capacity.
    head: usize,
    /// Set once the write cursor has wrapped at least once.
    full: bool,
}

/// Fixed-capacity ring with drop-oldest overwrite and linearized snapshots.
///
/// Shared between one producer and any number of snapshot readers as
/// `Arc<RingBuffer>`; all operations serialize on an internal lock.
pub struct RingBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl RingBuffer {
    /// Create a ring holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be at least 1 byte");
        Self {
            inner: Mutex::new(Inner {
                data: vec![0; capacity],
                head: 0,
                full: false,
            }),
            capacity,
        }
    }

    /// Append bytes, overwriting the oldest data once the ring is full.
    ///
    /// A payload larger than the capacity keeps only its trailing
    /// `capacity` bytes.
    pub fn append(&self, mut p: &[u8]) {
        let mut inner = self.inner.lock();

        if p.len() >= self.capacity {
            // Only the tail of the payload survives; lay it out linearly.
            let start = p.len() - self.capacity;
            inner.data.copy_from_slice(&p[start..]);
            inner.head = 0;
            inner.full = true;
            return;
        }

        while !p.is_empty() {
            let head = inner.head;
            let space = self.capacity - head;
            let n = p.len().min(space);
            inner.data[head..head + n].copy_from_slice(&p[..n]);
            inner.head += n;
            if inner.head == self.capacity {
                inner.head = 0;
                inner.full = true;
            }
            p = &p[n..];
        }
    }

    /// Copy out the current contents, oldest byte first.
    pub fn snapshot(&self) -> Vec<u8> {
        let inner = self.inner.lock();

        if !inner.full {
            return inner.data[..inner.head].to_vec();
        }

        let mut snap = Vec::with_capacity(self.capacity);
        snap.extend_from_slice(&inner.data[inner.head..]);
        snap.extend_from_slice(&inner.data[..inner.head]);
        snap
    }

    /// Number of bytes currently held.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        if inner.full {
            self.capacity
        } else {
            inner.head
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Logically discard all contents.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.head = 0;
        inner.full = false;
    }
}
