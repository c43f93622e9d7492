//! Size-keyed byte buffer reuse for the receive path.

use log::trace;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

type Bucket = Arc<Mutex<Vec<Vec<u8>>>>;

/// Free lists of byte buffers keyed by their exact length.
///
/// The map of buckets sits behind a read-write lock that is only written when
/// a new size shows up; each bucket has its own lock so readers of different
/// frame sizes never contend.
#[derive(Debug, Default)]
pub struct ByteBufferPool {
    buckets: RwLock<HashMap<usize, Bucket>>,
    leased: AtomicUsize,
    pooled: AtomicUsize,
}

impl ByteBufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leases a zero-filled buffer of exactly `size` bytes.
    pub fn get(&self, size: usize) -> Vec<u8> {
        let reused = self.bucket(size, false).and_then(|bucket| {
            let mut free = bucket.lock().unwrap_or_else(|e| e.into_inner());
            free.pop()
        });

        let buffer = match reused {
            Some(mut buffer) => {
                self.pooled.fetch_sub(size, Ordering::Relaxed);
                buffer.fill(0);
                buffer
            }
            None => vec![0; size],
        };
        let leased = self.leased.fetch_add(size, Ordering::Relaxed) + size;
        trace!(
            "Leased {} byte buffer ({} bytes leased, {} pooled)",
            size,
            leased,
            self.pooled.load(Ordering::Relaxed)
        );
        buffer
    }

    /// Returns a buffer obtained from [`get`](Self::get) to its free list.
    pub fn recycle(&self, buffer: Vec<u8>) {
        let size = buffer.len();
        if let Some(bucket) = self.bucket(size, true) {
            bucket
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(buffer);
        }
        let _ = self
            .leased
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |leased| {
                Some(leased.saturating_sub(size))
            });
        self.pooled.fetch_add(size, Ordering::Relaxed);
    }

    /// Drops every pooled buffer.
    pub fn clear(&self) {
        self.buckets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.pooled.store(0, Ordering::Relaxed);
    }

    /// Number of free buffers of `size` bytes.
    pub fn available(&self, size: usize) -> usize {
        match self.bucket(size, false) {
            Some(bucket) => {
                let free = bucket.lock().unwrap_or_else(|e| e.into_inner());
                free.len()
            }
            None => 0,
        }
    }

    pub fn leased_bytes(&self) -> usize {
        self.leased.load(Ordering::Relaxed)
    }

    pub fn pooled_bytes(&self) -> usize {
        self.pooled.load(Ordering::Relaxed)
    }

    fn bucket(&self, size: usize, create: bool) -> Option<Bucket> {
        if let Some(bucket) = self
            .buckets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&size)
        {
            return Some(Arc::clone(bucket));
        }
        if !create {
            return None;
        }
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        Some(Arc::clone(buckets.entry(size).or_default()))
    }
}
