//! Cooperative cancellation
//!
//! Each running script carries one [`StopToken`]. Stop sets a flag and wakes
//! any in-progress wait; every blocking point re-checks the flag and unwinds
//! with [`ScriptError::Stopped`]. There is no thread interruption anywhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::ScriptError;

/// Upper clamp for a single pause
pub const MAX_PAUSE: Duration = Duration::from_secs(60);

struct Inner {
    stopped: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Shared stop flag plus a wakeup signal for paused threads
#[derive(Clone)]
pub struct StopToken {
    inner: Arc<Inner>,
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

impl StopToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                stopped: AtomicBool::new(false),
                lock: Mutex::new(()),
                wake: Condvar::new(),
            }),
        }
    }

    /// Set the flag and wake every waiter
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let _guard = self.inner.lock.lock().unwrap();
        self.inner.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Return `Err(Stopped)` if the flag is set
    pub fn check(&self) -> Result<(), ScriptError> {
        if self.is_stopped() {
            Err(ScriptError::Stopped)
        } else {
            Ok(())
        }
    }

    /// Block the calling thread for `duration` (clamped to [`MAX_PAUSE`]),
    /// unwinding promptly if the token is stopped meanwhile.
    pub fn pause(&self, duration: Duration) -> Result<(), ScriptError> {
        let duration = duration.min(MAX_PAUSE);
        let deadline = Instant::now() + duration;
        let mut guard = self.inner.lock.lock().unwrap();
        loop {
            if self.is_stopped() {
                return Err(ScriptError::Stopped);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let (next, _timed_out) = self
                .inner
                .wake
                .wait_timeout(guard, deadline - now)
                .unwrap();
            guard = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn pause_completes_when_not_stopped() {
        let token = StopToken::new();
        let start = Instant::now();
        token.pause(Duration::from_millis(30)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn stop_unwinds_a_long_pause_promptly() {
        let token = StopToken::new();
        let waiter = token.clone();
        let handle = thread::spawn(move || {
            let start = Instant::now();
            let result = waiter.pause(Duration::from_secs(10));
            (start.elapsed(), result)
        });

        thread::sleep(Duration::from_millis(50));
        token.stop();

        let (elapsed, result) = handle.join().unwrap();
        assert!(matches!(result, Err(ScriptError::Stopped)));
        assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
    }

    #[test]
    fn pause_after_stop_returns_immediately() {
        let token = StopToken::new();
        token.stop();
        let start = Instant::now();
        assert!(token.pause(Duration::from_secs(5)).is_err());
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
