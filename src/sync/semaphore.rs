//! Blocking counting semaphore for thread handoff.
//!
//! Used by the notification dispatcher: a producer posts one semaphore and
//! waits on another, the worker does the opposite. Permits posted before a
//! wait are not lost.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A counting semaphore that parks OS threads.
#[derive(Debug, Default)]
pub struct BlockingSemaphore {
    permits: Mutex<usize>,
    cvar: Condvar,
}

impl BlockingSemaphore {
    /// Creates a semaphore holding `permits`.
    #[must_use]
    pub const fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            cvar: Condvar::new(),
        }
    }

    /// Adds one permit and wakes one waiter.
    pub fn post(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.cvar.notify_one();
    }

    /// Takes one permit, blocking until one is available.
    pub fn wait(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.cvar.wait(&mut permits);
        }
        *permits -= 1;
    }

    /// Takes one permit, giving up after `timeout`.
    ///
    /// Returns true if a permit was taken.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut permits = self.permits.lock();
        while *permits == 0 {
            if self.cvar.wait_until(&mut permits, deadline).timed_out() {
                if *permits == 0 {
                    return false;
                }
                break;
            }
        }
        *permits -= 1;
        true
    }

    /// Current permit count.
    #[must_use]
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }
}
