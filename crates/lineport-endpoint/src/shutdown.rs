use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cooperative, one-way stop signal shared by every loop of an endpoint.
///
/// Cloning yields handles to the same latch. Once triggered it never resets;
/// worker loops stop taking iterations and timed waits (reconnect delays)
/// return immediately.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    stopping: AtomicBool,
    lock: Mutex<()>,
    wakeup: Condvar,
}

impl ShutdownToken {
    /// Create an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the token. Returns `true` only for the call that performed the
    /// transition, which makes it double as an idempotence guard.
    pub fn trigger(&self) -> bool {
        if self.inner.stopping.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.inner.wakeup.notify_all();
        true
    }

    /// Whether the token has been triggered.
    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::SeqCst)
    }

    /// Sleep up to `timeout`, returning early if the token triggers.
    /// Returns `true` when the token is triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while !self.is_stopping() {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            guard = self
                .inner
                .wakeup
                .wait_timeout(guard, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn trigger_latches_once() {
        let token = ShutdownToken::new();
        assert!(!token.is_stopping());
        assert!(token.trigger());
        assert!(token.is_stopping());
        assert!(!token.trigger());
        assert!(token.is_stopping());
    }

    #[test]
    fn wait_times_out_when_untriggered() {
        let token = ShutdownToken::new();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn wait_returns_early_on_trigger() {
        let token = ShutdownToken::new();
        let trigger_handle = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                token.trigger();
            })
        };

        let start = Instant::now();
        assert!(token.wait_timeout(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(5));
        trigger_handle.join().expect("trigger thread should finish");
    }

    #[test]
    fn wait_on_triggered_token_returns_immediately() {
        let token = ShutdownToken::new();
        token.trigger();
        assert!(token.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn clones_share_the_latch() {
        let token = ShutdownToken::new();
        let clone = token.clone();
        clone.trigger();
        assert!(token.is_stopping());
    }
}
