use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, trace};

use crate::queue::BoundedQueue;
use crate::shutdown::ShutdownToken;

/// Default blocking-dequeue timeout for a drain loop iteration.
pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(10);

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;

/// Whether a worker slot currently has a drain loop executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        if raw == STATE_RUNNING {
            WorkerState::Running
        } else {
            WorkerState::Idle
        }
    }
}

/// How dequeued messages are handed to the dispatch closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Dispatch runs inside the drain loop. Messages are handled strictly in
    /// dequeue order; a slow dispatch delays subsequent drains.
    Inline,
    /// Dispatch runs on its own fire-and-forget thread per message, so slow
    /// handlers cannot stall draining. Completion order is unordered and
    /// concurrency is uncapped.
    Spawned,
}

/// A self-terminating queue drainer.
///
/// The worker has no permanently running thread. [`ensure_running`] starts a
/// drain loop only when the slot is idle; the loop exits as soon as the queue
/// is observed empty or a dequeue times out, and is restarted on demand by
/// the next trigger. At most one drain loop runs per worker slot, enforced by
/// a compare-and-swap on the state flag rather than a lock.
///
/// There is a narrow window between the flag flipping to idle and the loop
/// actually returning in which a trigger can start a second, short-lived
/// loop. That duplicate is harmless: the queue serializes consumption.
///
/// [`ensure_running`]: LazyWorker::ensure_running
pub struct LazyWorker<T> {
    inner: Arc<WorkerInner<T>>,
}

impl<T> Clone for LazyWorker<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct WorkerInner<T> {
    name: &'static str,
    state: AtomicU8,
    queue: Arc<BoundedQueue<T>>,
    token: ShutdownToken,
    dequeue_timeout: Duration,
    mode: DispatchMode,
    dispatch: Box<dyn Fn(T) + Send + Sync>,
}

impl<T: Send + 'static> LazyWorker<T> {
    /// Create an idle worker slot draining `queue` into `dispatch`.
    pub fn new(
        name: &'static str,
        queue: Arc<BoundedQueue<T>>,
        token: ShutdownToken,
        dequeue_timeout: Duration,
        mode: DispatchMode,
        dispatch: impl Fn(T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                name,
                state: AtomicU8::new(STATE_IDLE),
                queue,
                token,
                dequeue_timeout,
                mode,
                dispatch: Box::new(dispatch),
            }),
        }
    }

    /// Start a drain loop if none is running. A no-op while one is already
    /// active, and after the stop token has triggered.
    pub fn ensure_running(&self) {
        if self.inner.token.is_stopping() {
            return;
        }
        if self
            .inner
            .state
            .compare_exchange(STATE_IDLE, STATE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!(worker = self.inner.name, "drain loop already running");
            return;
        }

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(format!("{}-drain", self.inner.name))
            .spawn(move || inner.drain());
        if let Err(err) = spawned {
            self.inner.state.store(STATE_IDLE, Ordering::Release);
            error!(worker = self.inner.name, %err, "failed to spawn drain loop");
        }
    }

    /// Current state of the worker slot.
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.inner.state.load(Ordering::Acquire))
    }
}

impl<T: Send + 'static> WorkerInner<T> {
    fn drain(self: Arc<Self>) {
        // Flips the slot back to idle on every exit path, panics included —
        // a slot stuck at running with no live loop would permanently wedge
        // ensure_running.
        let _idle_on_exit = IdleGuard(&self.state);

        loop {
            if self.token.is_stopping() {
                debug!(worker = self.name, "stop requested; drain loop exiting");
                return;
            }

            let Some(msg) = self.queue.dequeue(self.dequeue_timeout) else {
                trace!(worker = self.name, "dequeue timed out; drain loop exiting");
                return;
            };

            match self.mode {
                DispatchMode::Inline => (self.dispatch)(msg),
                DispatchMode::Spawned => {
                    let inner = Arc::clone(&self);
                    let spawned = thread::Builder::new()
                        .name(format!("{}-dispatch", self.name))
                        .spawn(move || (inner.dispatch)(msg));
                    if let Err(err) = spawned {
                        error!(worker = self.name, %err, "failed to spawn dispatch; message lost");
                    }
                }
            }

            if self.queue.is_empty() {
                trace!(worker = self.name, "queue drained; drain loop exiting");
                return;
            }
        }
    }
}

struct IdleGuard<'a>(&'a AtomicU8);

impl Drop for IdleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(STATE_IDLE, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;

    fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn counting_worker(
        queue: &Arc<BoundedQueue<u32>>,
        mode: DispatchMode,
    ) -> (LazyWorker<u32>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatch_count = Arc::clone(&count);
        let worker = LazyWorker::new(
            "test",
            Arc::clone(queue),
            ShutdownToken::new(),
            Duration::from_millis(100),
            mode,
            move |_msg| {
                dispatch_count.fetch_add(1, Ordering::SeqCst);
            },
        );
        (worker, count)
    }

    #[test]
    fn drains_queue_then_goes_idle() {
        let queue = Arc::new(BoundedQueue::new(10));
        let (worker, count) = counting_worker(&queue, DispatchMode::Inline);

        for i in 0..3 {
            assert!(queue.try_enqueue(i));
        }
        worker.ensure_running();

        assert!(wait_until(Duration::from_secs(2), || {
            count.load(Ordering::SeqCst) == 3 && worker.state() == WorkerState::Idle
        }));
        assert!(queue.is_empty());
    }

    #[test]
    fn idles_within_one_timeout_of_empty_queue() {
        let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(4));
        let (worker, count) = counting_worker(&queue, DispatchMode::Inline);

        worker.ensure_running();
        assert!(wait_until(Duration::from_millis(500), || {
            worker.state() == WorkerState::Idle
        }));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn restarts_after_going_idle() {
        let queue = Arc::new(BoundedQueue::new(10));
        let (worker, count) = counting_worker(&queue, DispatchMode::Inline);

        assert!(queue.try_enqueue(1));
        worker.ensure_running();
        assert!(wait_until(Duration::from_secs(2), || {
            count.load(Ordering::SeqCst) == 1 && worker.state() == WorkerState::Idle
        }));

        assert!(queue.try_enqueue(2));
        worker.ensure_running();
        assert!(wait_until(Duration::from_secs(2), || {
            count.load(Ordering::SeqCst) == 2
        }));
    }

    #[test]
    fn concurrent_triggers_dispatch_each_message_once() {
        let queue = Arc::new(BoundedQueue::new(50));
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let gate_rx = Mutex::new(gate_rx);
        let count = Arc::new(AtomicUsize::new(0));

        let dispatch_count = Arc::clone(&count);
        let worker = LazyWorker::new(
            "gated",
            Arc::clone(&queue),
            ShutdownToken::new(),
            Duration::from_millis(500),
            DispatchMode::Inline,
            move |_msg: u32| {
                // First dispatch blocks until the gate opens, holding the
                // loop in Running while triggers pile up.
                let _ = gate_rx
                    .lock()
                    .expect("gate receiver lock")
                    .recv_timeout(Duration::from_millis(50));
                dispatch_count.fetch_add(1, Ordering::SeqCst);
            },
        );

        for i in 0..20 {
            assert!(queue.try_enqueue(i));
        }

        let mut triggers = Vec::new();
        for _ in 0..8 {
            let worker = worker.clone();
            triggers.push(thread::spawn(move || {
                for _ in 0..10 {
                    worker.ensure_running();
                }
            }));
        }
        for handle in triggers {
            handle.join().expect("trigger thread should finish");
        }
        drop(gate_tx);

        assert!(wait_until(Duration::from_secs(5), || {
            count.load(Ordering::SeqCst) == 20 && worker.state() == WorkerState::Idle
        }));
        assert!(queue.is_empty());
    }

    #[test]
    fn spawned_dispatch_does_not_block_draining() {
        let queue = Arc::new(BoundedQueue::new(10));
        let count = Arc::new(AtomicUsize::new(0));
        let dispatch_count = Arc::clone(&count);
        let worker = LazyWorker::new(
            "slow",
            Arc::clone(&queue),
            ShutdownToken::new(),
            Duration::from_millis(100),
            DispatchMode::Spawned,
            move |_msg: u32| {
                thread::sleep(Duration::from_millis(200));
                dispatch_count.fetch_add(1, Ordering::SeqCst);
            },
        );

        for i in 0..4 {
            assert!(queue.try_enqueue(i));
        }
        worker.ensure_running();

        // The queue empties long before any slow dispatch completes.
        assert!(wait_until(Duration::from_millis(150), || queue.is_empty()));
        assert!(wait_until(Duration::from_secs(2), || {
            count.load(Ordering::SeqCst) == 4
        }));
    }

    #[test]
    fn stopped_token_suppresses_new_loops() {
        let queue = Arc::new(BoundedQueue::new(10));
        let count = Arc::new(AtomicUsize::new(0));
        let token = ShutdownToken::new();

        let dispatch_count = Arc::clone(&count);
        let worker = LazyWorker::new(
            "stopped",
            Arc::clone(&queue),
            token.clone(),
            Duration::from_millis(100),
            DispatchMode::Inline,
            move |_msg: u32| {
                dispatch_count.fetch_add(1, Ordering::SeqCst);
            },
        );

        token.trigger();
        assert!(queue.try_enqueue(1));
        worker.ensure_running();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(worker.state(), WorkerState::Idle);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn panicking_dispatch_leaves_slot_usable() {
        let queue = Arc::new(BoundedQueue::new(10));
        let count = Arc::new(AtomicUsize::new(0));
        let dispatch_count = Arc::clone(&count);
        let worker = LazyWorker::new(
            "panicky",
            Arc::clone(&queue),
            ShutdownToken::new(),
            Duration::from_millis(100),
            DispatchMode::Inline,
            move |msg: u32| {
                if msg == 0 {
                    panic!("dispatch failure");
                }
                dispatch_count.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert!(queue.try_enqueue(0));
        worker.ensure_running();
        assert!(wait_until(Duration::from_secs(2), || {
            worker.state() == WorkerState::Idle
        }));

        // The slot recovered: a later trigger drains normally.
        assert!(queue.try_enqueue(1));
        worker.ensure_running();
        assert!(wait_until(Duration::from_secs(2), || {
            count.load(Ordering::SeqCst) == 1
        }));
    }
}
