//! Timer primitives shared by the engine's background workers.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A latch that background workers park on between ticks.
///
/// `wait_for` doubles as an interruptible sleep: it returns early, and
/// reports `true`, as soon as the latch is signalled.
pub(crate) struct Shutdown {
    signalled: Mutex<bool>,
    cv: Condvar,
}

impl Shutdown {
    pub(crate) fn new() -> Self {
        Self {
            signalled: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Trips the latch and wakes every parked worker.
    pub(crate) fn signal(&self) {
        *self.signalled.lock() = true;
        self.cv.notify_all();
    }

    /// Re-arms the latch for a fresh start.
    pub(crate) fn reset(&self) {
        *self.signalled.lock() = false;
    }

    pub(crate) fn is_signalled(&self) -> bool {
        *self.signalled.lock()
    }

    /// Sleeps up to `timeout`. Returns true if the latch tripped meanwhile.
    pub(crate) fn wait_for(&self, timeout: Duration) -> bool {
        let mut signalled = self.signalled.lock();
        if *signalled {
            return true;
        }
        let _ = self.cv.wait_for(&mut signalled, timeout);
        *signalled
    }
}

/// Deadline cell backing the debounced push.
///
/// Every local mutation moves the deadline forward; the worker fires only
/// once a full quiet window has elapsed since the last mutation.
pub(crate) struct Debounce {
    deadline: Mutex<Option<Instant>>,
    cv: Condvar,
}

impl Debounce {
    pub(crate) fn new() -> Self {
        Self {
            deadline: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    /// Re-arms the deadline to `delay` from now.
    pub(crate) fn schedule(&self, delay: Duration) {
        *self.deadline.lock() = Some(Instant::now() + delay);
        self.cv.notify_one();
    }

    /// Wakes the worker so it can observe a tripped shutdown latch.
    ///
    /// Takes the deadline lock so the notification cannot slip between the
    /// worker's latch check and its wait.
    pub(crate) fn interrupt(&self) {
        let _guard = self.deadline.lock();
        self.cv.notify_all();
    }

    /// Parks until the current deadline expires, then clears and returns it.
    ///
    /// Returns `None` when `stop` trips while parked.
    pub(crate) fn wait_expired(&self, stop: &Shutdown) -> Option<()> {
        let mut deadline = self.deadline.lock();
        loop {
            if stop.is_signalled() {
                return None;
            }
            match *deadline {
                None => {
                    self.cv.wait(&mut deadline);
                }
                Some(due) => {
                    let now = Instant::now();
                    if now >= due {
                        *deadline = None;
                        return Some(());
                    }
                    let _ = self.cv.wait_for(&mut deadline, due - now);
                }
            }
        }
    }
}
