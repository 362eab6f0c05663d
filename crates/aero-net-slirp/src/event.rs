use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Binary auto-reset event.
///
/// `set` latches the event and wakes a waiter; the waiter that observes it consumes the latch.
/// Used for the poll thread's start/stop handshake and as its interruptible idle sleep.
#[derive(Debug, Default)]
pub struct EventGate {
    signaled: Mutex<bool>,
    cv: Condvar,
}

impl EventGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        match self.signaled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set(&self) {
        *self.lock() = true;
        self.cv.notify_one();
    }

    /// Clear a latched signal without waiting.
    pub fn reset(&self) {
        *self.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.lock()
    }

    /// Block until the event is set, then consume it.
    pub fn wait(&self) {
        let mut signaled = self.lock();
        while !*signaled {
            signaled = match self.cv.wait(signaled) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        *signaled = false;
    }

    /// Wait at most `timeout` for the event. Returns `true` (and consumes the signal) if it was
    /// set, `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            // Timeout too large to represent: behave like an unbounded wait.
            self.wait();
            return true;
        };
        let mut signaled = self.lock();
        while !*signaled {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return false,
            };
            signaled = match self.cv.wait_timeout(signaled, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *signaled = false;
        true
    }
}
