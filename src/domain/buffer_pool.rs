use crossbeam_queue::ArrayQueue;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Idle buffers kept around when no explicit bound is given.
const DEFAULT_MAX_IDLE: usize = 1024;

/// Shared free-list of fixed-capacity scratch buffers for the relay loops.
///
/// Cloning is cheap; all clones share the same free-list.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    capacity: usize,
    idle: ArrayQueue<Vec<u8>>,
    allocated: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub idle: usize,
    pub allocated: usize,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self::with_max_idle(capacity, DEFAULT_MAX_IDLE)
    }

    pub fn with_max_idle(capacity: usize, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity: capacity.max(1),
                idle: ArrayQueue::new(max_idle.max(1)),
                allocated: AtomicUsize::new(0),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Hands out an idle buffer, or allocates a new one.
    ///
    /// The returned buffer always has `len() == capacity()`.
    pub fn acquire(&self) -> PooledBuffer {
        let buf = self.inner.idle.pop().unwrap_or_else(|| {
            self.inner.allocated.fetch_add(1, Ordering::Relaxed);
            vec![0; self.inner.capacity]
        });
        PooledBuffer {
            buf,
            pool: self.clone(),
        }
    }

    /// Returns a buffer to the free-list after restoring its full length.
    ///
    /// Buffers are dropped when the free-list is already full.
    pub fn release(&self, mut buf: Vec<u8>) {
        if buf.len() != self.inner.capacity {
            buf.resize(self.inner.capacity, 0);
        }
        let _ = self.inner.idle.push(buf);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.inner.capacity,
            idle: self.inner.idle.len(),
            allocated: self.inner.allocated.load(Ordering::Relaxed),
        }
    }
}

/// A buffer borrowed from a [`BufferPool`], returned to it on drop.
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: BufferPool,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
