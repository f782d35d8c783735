//! Bounded SPSC output queues.
//!
//! Every record leaving the real-time task (deferred network outputs, DAQ
//! scans, transition notifications) goes through one of these. The producer
//! never blocks: a push onto a full queue drops the record and bumps a
//! counter. Storage is allocated once, at construction.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ringbuf::traits::{Consumer as _, Observer as _, Producer as _, Split as _};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Push/drop counters shared by both ends of a queue.
#[derive(Debug, Default)]
pub struct QueueStats {
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl QueueStats {
    #[inline]
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Records lost because the queue was full.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Real-time side of a queue.
pub struct QueueProducer<T> {
    inner: HeapProd<T>,
    stats: Arc<QueueStats>,
}

/// Non-real-time side of a queue.
pub struct QueueConsumer<T> {
    inner: HeapCons<T>,
    stats: Arc<QueueStats>,
}

/// Create a queue holding at most `capacity` records.
pub fn bounded<T>(capacity: usize) -> (QueueProducer<T>, QueueConsumer<T>) {
    let rb = HeapRb::<T>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    let stats = Arc::new(QueueStats::default());
    (
        QueueProducer {
            inner: producer,
            stats: Arc::clone(&stats),
        },
        QueueConsumer {
            inner: consumer,
            stats,
        },
    )
}

impl<T> QueueProducer<T> {
    /// Push without blocking. Returns `false` and counts a drop when full.
    #[inline]
    pub fn push(&mut self, item: T) -> bool {
        match self.inner.try_push(item) {
            Ok(()) => {
                self.stats.pushed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }

    #[inline]
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

impl<T> QueueConsumer<T> {
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.inner.try_pop()
    }

    /// Pop everything currently queued into `f`. Returns the number drained.
    pub fn drain(&mut self, mut f: impl FnMut(T)) -> usize {
        let mut n = 0;
        while let Some(item) = self.inner.try_pop() {
            f(item);
            n += 1;
        }
        n
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }

    #[inline]
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

impl<T> std::fmt::Debug for QueueProducer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueProducer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("dropped", &self.stats.dropped())
            .finish()
    }
}

impl<T> std::fmt::Debug for QueueConsumer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConsumer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
