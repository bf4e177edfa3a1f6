//! Buffer pool implementation for efficient buffer reuse
//!
//! This module provides a thread-safe pool of relay buffers. The pool bounds
//! the number of buffers alive at once, which in turn bounds the memory the
//! relay can commit to in-flight connections (two buffers per bridge, one per
//! direction).

use bytes::BytesMut;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A pool of reusable byte buffers
///
/// It is thread-safe and can be shared between multiple tasks.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

/// Inner implementation of the buffer pool
struct BufferPoolInner {
    /// Semaphore to limit the number of buffers that can be borrowed
    semaphore: Arc<Semaphore>,
    /// Capacity of each buffer
    buffer_capacity: usize,
}

/// A buffer borrowed from the pool
///
/// When dropped, its slot is returned to the pool.
pub struct PooledBuffer {
    /// The actual buffer, zero-filled to the pool's capacity
    pub buffer: BytesMut,
    /// Semaphore permit released when this buffer is dropped
    _permit: OwnedSemaphorePermit,
}

impl BufferPool {
    /// Create a new buffer pool
    ///
    /// # Parameters
    ///
    /// * `max_buffers` - Maximum number of buffers that can be borrowed at once
    /// * `buffer_capacity` - Capacity of each buffer
    pub fn new(max_buffers: usize, buffer_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                semaphore: Arc::new(Semaphore::new(max_buffers)),
                buffer_capacity,
            }),
        }
    }

    /// Borrow a buffer from the pool
    ///
    /// If the pool is at capacity, this waits until a buffer is returned.
    pub async fn get_buffer(&self) -> PooledBuffer {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .expect("buffer pool semaphore is never closed");

        PooledBuffer {
            buffer: BytesMut::zeroed(self.inner.buffer_capacity),
            _permit: permit,
        }
    }

    /// Borrow the two buffers for one bridge in a single acquisition
    ///
    /// The permits for both directions are taken atomically. Taking them one
    /// at a time would let concurrent bridges each hold one permit while
    /// waiting for a second, deadlocking the pool once it runs out.
    pub async fn get_buffer_pair(&self) -> (PooledBuffer, PooledBuffer) {
        let mut permit = Arc::clone(&self.inner.semaphore)
            .acquire_many_owned(2)
            .await
            .expect("buffer pool semaphore is never closed");
        let second = permit
            .split(1)
            .expect("permit covers two buffers");

        (
            PooledBuffer {
                buffer: BytesMut::zeroed(self.inner.buffer_capacity),
                _permit: permit,
            },
            PooledBuffer {
                buffer: BytesMut::zeroed(self.inner.buffer_capacity),
                _permit: second,
            },
        )
    }

    /// Try to borrow a buffer from the pool without waiting
    ///
    /// # Returns
    ///
    /// Some(PooledBuffer) if a buffer is available, None otherwise
    pub fn try_get_buffer(&self) -> Option<PooledBuffer> {
        let permit = Arc::clone(&self.inner.semaphore).try_acquire_owned().ok()?;

        Some(PooledBuffer {
            buffer: BytesMut::zeroed(self.inner.buffer_capacity),
            _permit: permit,
        })
    }

    /// Capacity of the buffers handed out by this pool
    pub fn buffer_capacity(&self) -> usize {
        self.inner.buffer_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffer_pool() {
        // Create a pool with 2 buffers
        let pool = BufferPool::new(2, 1024);

        let buffer1 = pool.get_buffer().await;
        let buffer2 = pool.get_buffer().await;

        assert_eq!(buffer1.buffer.len(), 1024);
        assert_eq!(buffer2.buffer.len(), 1024);

        // Try to borrow a third buffer (should fail)
        assert!(pool.try_get_buffer().is_none());

        // Drop one buffer
        drop(buffer1);

        // Now we should be able to borrow another buffer
        let buffer3 = pool.try_get_buffer();
        assert!(buffer3.is_some());
    }

    #[tokio::test]
    async fn test_pair_acquisition_never_interleaves() {
        // Four bridges contend for a pool that fits exactly one pair. With
        // atomic pair acquisition they serialize; with one-at-a-time permits
        // two of them would each hold one permit and wait forever.
        let pool = BufferPool::new(2, 64);

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                let _pair = pool.get_buffer_pair().await;
            }));
        }

        for task in tasks {
            tokio::time::timeout(std::time::Duration::from_secs(2), task)
                .await
                .expect("pair acquisition deadlocked")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_pair_returns_both_permits() {
        let pool = BufferPool::new(2, 64);

        let pair = pool.get_buffer_pair().await;
        assert!(pool.try_get_buffer().is_none());

        drop(pair);
        let first = pool.try_get_buffer();
        let second = pool.try_get_buffer();
        assert!(first.is_some());
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn test_buffers_are_zeroed() {
        let pool = BufferPool::new(1, 16);

        let mut buffer = pool.get_buffer().await;
        buffer.buffer[..5].copy_from_slice(b"hello");
        drop(buffer);

        let buffer = pool.get_buffer().await;
        assert!(buffer.buffer.iter().all(|b| *b == 0));
    }
}
