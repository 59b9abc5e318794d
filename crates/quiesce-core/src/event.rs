//! Resettable single-shot wake edge for the reclaimer.
//!
//! The edge doubles as the reclaimer's early-wake mechanism and its
//! shutdown request: `set` is sticky, so once signaled every subsequent
//! wait returns immediately until `reset`. Waiters distinguish a signal
//! from a periodic-tick timeout; spurious condvar wakeups are absorbed by
//! re-checking the flag against the deadline.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Why a `wait_timeout` call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WakeReason {
    /// The edge was set before or during the wait.
    Signal,
    /// The timeout elapsed with the edge still clear.
    Timeout,
}

/// Sticky one-shot event: set/wait-with-timeout/reset.
pub(crate) struct WakeEdge {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl WakeEdge {
    pub(crate) const fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Raise the edge and wake any waiter. Stays raised until `reset`.
    pub(crate) fn set(&self) {
        let mut flag = self.flag.lock();
        *flag = true;
        self.cond.notify_all();
    }

    /// Lower the edge so subsequent waits block again.
    pub(crate) fn reset(&self) {
        *self.flag.lock() = false;
    }

    /// Block until the edge is set or `timeout` elapses.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> WakeReason {
        let mut flag = self.flag.lock();
        if !*flag {
            // Timeout and signal are disambiguated by the flag itself.
            let _ = self.cond.wait_while_for(&mut flag, |set| !*set, timeout);
        }
        if *flag {
            WakeReason::Signal
        } else {
            WakeReason::Timeout
        }
    }
}
