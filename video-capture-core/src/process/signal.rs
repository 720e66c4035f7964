use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A settable flag that threads can block on.
///
/// A manual-reset event stays set until [`reset`](Self::reset) is called and
/// releases every waiter. An auto-reset event releases a single waiter and
/// clears itself.
#[derive(Debug)]
pub struct Event {
    signaled: Mutex<bool>,
    cond: Condvar,
    auto_reset: bool,
}

impl Event {
    pub fn manual(initial: bool) -> Self {
        Self::new(initial, false)
    }

    pub fn auto(initial: bool) -> Self {
        Self::new(initial, true)
    }

    fn new(initial: bool, auto_reset: bool) -> Self {
        Self {
            signaled: Mutex::new(initial),
            cond: Condvar::new(),
            auto_reset,
        }
    }

    pub fn set(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        if self.auto_reset {
            self.cond.notify_one();
        } else {
            self.cond.notify_all();
        }
    }

    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.signaled.lock()
    }

    /// Block until the event is set.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cond.wait(&mut signaled);
        }
        if self.auto_reset {
            *signaled = false;
        }
    }

    /// Block until the event is set or `timeout` elapses. Returns whether it was set.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                break;
            }
        }
        let was_set = *signaled;
        if was_set && self.auto_reset {
            *signaled = false;
        }
        was_set
    }
}
