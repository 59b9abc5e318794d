//! RCU controller: reader registry, callback queues, grace-period detection.
//!
//! The controller keeps two callback queues so that work enqueued during a
//! grace-period observation never perturbs the cohort being observed:
//! writers append to `callbacks`, and the reclaimer swaps that batch into
//! `next` only once the previous `next` has drained. One reclaimer pass:
//!
//! 1. Wait on the wake edge with the periodic tick, noting signal vs
//!    timeout.
//! 2. Under the mutex, swap `callbacks` into `next` if `next` is empty;
//!    that swap makes this the *initiating* pass for the new batch.
//! 3. If `next` is still empty there is nothing to reclaim: exit when the
//!    wake was a signal (shutdown), otherwise keep polling.
//! 4. Evaluate the grace period over the tracker set. On success, reset the
//!    scratch flags, fence, and invoke the batch in insertion order.
//!
//! ## Grace-period detection
//!
//! The initiating pass stores `true` into every active reader's pin. A
//! reader is quiescent once the reclaimer observes either a cleared pin
//! (the reader ran an outermost `unlock`, whose fence-then-clear orders all
//! its section reads before our observation) or a zero nesting depth (the
//! reader holds no live references at all). Observations accumulate in the
//! trackers' scratch flags across continuation passes; when every tracker
//! has produced one, nodes unlinked before the batch swap are unreachable
//! by any current or future reader and the batch may fire.

#![allow(unsafe_code)]

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{Ordering, fence};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::Error;
use crate::event::{WakeEdge, WakeReason};
use crate::reader::Reader;

/// Reclaimer poll tick: the longest a drainable batch waits for a pass.
pub const RECLAIM_TICK: Duration = Duration::from_millis(8);

/// A deferred reclamation action. `arg` is an erased pointer-sized payload
/// owned by the callback from the moment it is invoked.
pub type ReclaimFn = fn(usize);

struct Callback {
    func: ReclaimFn,
    arg: usize,
}

/// Registry entry for one live reader. `quiescent` is scratch state for the
/// grace-period observation currently in progress, reset after each batch.
struct Tracker {
    reader: Arc<Reader>,
    quiescent: bool,
}

#[derive(Default)]
struct State {
    trackers: Vec<Tracker>,
    /// Current batch, still accepting writer appends.
    callbacks: Vec<Callback>,
    /// Batch under grace-period observation. Touched only by the reclaimer.
    next: Vec<Callback>,
}

struct Shared {
    state: Mutex<State>,
    wake: WakeEdge,
}

/// The RCU controller. One per protected structure (or group of them).
///
/// Readers register once, then bracket accesses with [`Reader::lock`] /
/// [`Reader::unlock`] without ever touching the controller. Writers enqueue
/// reclamation callbacks with [`Rcu::call`]; the background reclaimer
/// invokes each exactly once after a full grace period.
pub struct Rcu {
    shared: Arc<Shared>,
    background: Option<JoinHandle<()>>,
}

impl Default for Rcu {
    fn default() -> Self {
        Self::new()
    }
}

impl Rcu {
    /// New controller: empty registry, empty queues, no reclaimer thread.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                wake: WakeEdge::new(),
            }),
            background: None,
        }
    }

    /// Register a reader with this controller.
    ///
    /// # Panics
    ///
    /// Panics if `reader` is already registered here.
    pub fn add_reader(&self, reader: &Arc<Reader>) -> Result<(), Error> {
        let mut state = self.shared.state.lock();
        let duplicate = state
            .trackers
            .iter()
            .any(|tracker| Arc::ptr_eq(&tracker.reader, reader));
        assert!(!duplicate, "reader is already registered");
        state.trackers.try_reserve(1)?;
        state.trackers.push(Tracker {
            reader: Arc::clone(reader),
            quiescent: false,
        });
        Ok(())
    }

    /// Unregister a reader. The reader must be outside any read section.
    ///
    /// # Panics
    ///
    /// Panics if `reader` is not registered, or if its nesting depth is
    /// non-zero at removal time.
    pub fn remove_reader(&self, reader: &Arc<Reader>) {
        let mut state = self.shared.state.lock();
        let position = state
            .trackers
            .iter()
            .position(|tracker| Arc::ptr_eq(&tracker.reader, reader))
            .expect("reader is not registered");
        assert_eq!(
            reader.depth(),
            0,
            "reader removed while inside a read section"
        );
        state.trackers.swap_remove(position);
    }

    /// Enqueue `func(arg)` to run on the reclaimer thread after a full
    /// grace period relative to this call. Invoked at most once; within a
    /// batch, callbacks run in insertion order.
    ///
    /// # Safety
    ///
    /// The caller transfers ownership of whatever `arg` encodes: it must
    /// remain valid until the callback runs, and the callback is
    /// responsible for all reclamation, including `arg` itself. Callbacks
    /// must not re-enter controller methods (the controller mutex is held
    /// during invocation).
    pub unsafe fn call(&self, func: ReclaimFn, arg: usize) -> Result<(), Error> {
        let mut state = self.shared.state.lock();
        state.callbacks.try_reserve(1)?;
        state.callbacks.push(Callback { func, arg });
        Ok(())
    }

    /// Spawn the background reclaimer.
    ///
    /// # Panics
    ///
    /// Panics if a reclaimer is already running.
    pub fn start_background(&mut self) -> Result<(), Error> {
        assert!(
            self.background.is_none(),
            "reclaimer thread is already running"
        );
        self.shared.wake.reset();
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("quiesce-reclaimer".into())
            .spawn(move || reclaimer_loop(&shared))?;
        self.background = Some(handle);
        Ok(())
    }

    /// Signal the reclaimer to shut down and join it.
    ///
    /// The reclaimer drains every batch whose grace period it can still
    /// prove before exiting. Callbacks enqueued concurrently with shutdown
    /// may remain undrained; their payloads stay the caller's
    /// responsibility. No-op when no reclaimer is running.
    pub fn stop_background(&mut self) {
        if let Some(handle) = self.background.take() {
            self.shared.wake.set();
            handle.join().expect("reclaimer thread panicked");
        }
    }
}

impl Drop for Rcu {
    /// Stops the reclaimer. Registered readers may outlive the controller;
    /// they must simply be outside any read section.
    ///
    /// # Panics
    ///
    /// Panics if a registered reader is still inside a read section.
    fn drop(&mut self) {
        self.stop_background();
        let state = self.shared.state.lock();
        for tracker in &state.trackers {
            assert_eq!(
                tracker.reader.depth(),
                0,
                "controller dropped while a reader is inside a read section"
            );
        }
    }
}

fn reclaimer_loop(shared: &Shared) {
    loop {
        let reason = shared.wake.wait_timeout(RECLAIM_TICK);
        let mut guard = shared.state.lock();
        let state = &mut *guard;

        // A fresh batch swap makes this the initiating pass: it is the
        // first to see this cohort, so it must pin the active readers.
        let set_pin = if state.next.is_empty() {
            mem::swap(&mut state.callbacks, &mut state.next);
            true
        } else {
            false
        };

        if state.next.is_empty() {
            match reason {
                WakeReason::Signal => return,
                WakeReason::Timeout => continue,
            }
        }

        if grace_period_elapsed(&mut state.trackers, set_pin) {
            for tracker in &mut state.trackers {
                tracker.quiescent = false;
            }
            // Order the quiescence observations before every load the
            // callbacks make of the structures they tear down.
            fence(Ordering::SeqCst);
            let batch = mem::take(&mut state.next);
            for callback in batch {
                (callback.func)(callback.arg);
            }
        }
    }
}

/// One grace-period observation over the tracker set. Returns true only
/// when every tracker has been seen quiescent since the batch swap.
fn grace_period_elapsed(trackers: &mut [Tracker], set_pin: bool) -> bool {
    let mut all_quiescent = true;
    for tracker in trackers.iter_mut().filter(|tracker| !tracker.quiescent) {
        let reader = &tracker.reader;
        if set_pin {
            reader.request_pin();
        } else if !reader.pinned() {
            // The pin we planted has been cleared: the reader ran an
            // outermost unlock since the initiating pass.
            tracker.quiescent = true;
            continue;
        }
        if reader.depth() == 0 {
            tracker.quiescent = true;
        } else {
            all_quiescent = false;
        }
    }
    all_quiescent
}
