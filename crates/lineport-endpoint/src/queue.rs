use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Fixed-capacity FIFO queue shared between a producer and its worker.
///
/// Enqueue never blocks: at capacity the item is rejected and the caller
/// decides what to log. Dequeue blocks up to a timeout and returns `None`
/// when it elapses — a timeout is not an error. A poisoned lock is treated
/// as "no message" so a panicked peer thread can only make the worker
/// terminate its drain loop, never propagate.
pub struct BoundedQueue<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
        }
    }

    /// Append at the tail unless the queue is full. Returns `false` when the
    /// item was rejected.
    pub fn try_enqueue(&self, item: T) -> bool {
        let mut items = self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if items.len() >= self.capacity {
            return false;
        }
        items.push_back(item);
        drop(items);
        self.available.notify_one();
        true
    }

    /// Remove and return the head item, blocking up to `timeout`.
    pub fn dequeue(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            items = self
                .available
                .wait_timeout(items, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Snapshot hint: true when no items are queued. Race-tolerant — a
    /// worker may observe "empty" just as a producer enqueues; the producer
    /// re-triggers the worker after every enqueue, so nothing is stranded.
    pub fn is_empty(&self) -> bool {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Snapshot hint: true when the queue is at capacity.
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Snapshot of the current item count.
    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The fixed capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let queue = BoundedQueue::new(10);
        for i in 0..5 {
            assert!(queue.try_enqueue(i));
        }
        for expected in 0..5 {
            assert_eq!(queue.dequeue(Duration::from_millis(10)), Some(expected));
        }
    }

    #[test]
    fn enqueue_at_capacity_rejects_without_blocking() {
        let queue = BoundedQueue::new(50);
        for i in 0..50 {
            assert!(queue.try_enqueue(i), "item {i} should fit");
        }
        assert!(queue.is_full());

        let start = Instant::now();
        assert!(!queue.try_enqueue(50));
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(queue.len(), 50);
    }

    #[test]
    fn dequeue_times_out_with_none() {
        let queue: BoundedQueue<String> = BoundedQueue::new(4);
        let start = Instant::now();
        assert_eq!(queue.dequeue(Duration::from_millis(50)), None);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn blocked_dequeue_woken_by_enqueue() {
        let queue = Arc::new(BoundedQueue::new(4));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                assert!(queue.try_enqueue("late".to_string()));
            })
        };

        let item = queue.dequeue(Duration::from_secs(2));
        assert_eq!(item.as_deref(), Some("late"));
        producer.join().expect("producer thread should finish");
    }

    #[test]
    fn snapshots_track_contents() {
        let queue = BoundedQueue::new(2);
        assert!(queue.is_empty());
        assert!(!queue.is_full());

        assert!(queue.try_enqueue(1));
        assert_eq!(queue.len(), 1);

        assert!(queue.try_enqueue(2));
        assert!(queue.is_full());

        queue.dequeue(Duration::from_millis(10));
        assert!(!queue.is_full());
        assert_eq!(queue.capacity(), 2);
    }

    #[test]
    fn concurrent_producers_never_exceed_capacity() {
        let queue = Arc::new(BoundedQueue::new(50));
        let mut handles = Vec::new();
        for t in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                let mut accepted = 0usize;
                for i in 0..100 {
                    if queue.try_enqueue(t * 1000 + i) {
                        accepted += 1;
                    }
                }
                accepted
            }));
        }

        let accepted: usize = handles
            .into_iter()
            .map(|h| h.join().expect("producer should finish"))
            .sum();
        assert_eq!(accepted, 50);
        assert_eq!(queue.len(), 50);
    }
}
