//! Per-thread reader handle: read-side critical-section brackets.
//!
//! A `Reader` carries two words of per-thread state: the nesting depth of
//! active read sections and a pin flag the reclaimer uses to request a
//! quiescence announcement. Both are mutated with relaxed atomics; all
//! ordering on the read path comes from the full fences inside `lock` and
//! `unlock`.
//!
//! ## Protocol
//!
//! - `lock` increments the depth and then fences, so any list pointer loaded
//!   after `lock` returns happens-after the reclaimer could observe the
//!   incremented depth.
//! - `unlock` fences and then decrements, so every read made inside the
//!   section happens-before the reclaimer observes the reader at depth zero.
//! - The pin flag is cleared only when the depth returns to zero: a nested
//!   unlock must not retract an announcement the outer section still
//!   contradicts.
//!
//! The owning thread is the only caller of `lock`/`unlock`; the reclaimer
//! reads (and sets the pin on) this state concurrently through the atomics.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering, fence};

/// Per-thread read-side state. Register with [`crate::Rcu::add_reader`]
/// before the first `lock`; unregister only at depth zero.
#[derive(Debug, Default)]
pub struct Reader {
    /// Active read-section count on the owning thread.
    nesting: AtomicU8,
    /// Quiescence-announcement request from the reclaimer. Cleared by the
    /// owning thread at the outermost `unlock`.
    pin: AtomicBool,
}

impl Reader {
    /// New reader with no active read section and no pending pin.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nesting: AtomicU8::new(0),
            pin: AtomicBool::new(false),
        }
    }

    /// Enter a read-side critical section. Sections nest up to 255 deep.
    ///
    /// # Panics
    ///
    /// Panics on nesting overflow — an unbalanced or pathological caller.
    pub fn lock(&self) {
        let depth = self.nesting.load(Ordering::Relaxed);
        let raised = depth
            .checked_add(1)
            .expect("read-section nesting overflow (max 255)");
        self.nesting.store(raised, Ordering::Relaxed);
        fence(Ordering::SeqCst);
    }

    /// Leave a read-side critical section. The outermost unlock also clears
    /// a pending pin, announcing a quiescent point to the reclaimer.
    ///
    /// # Panics
    ///
    /// Panics if no section is active — an unlock without a matching lock.
    pub fn unlock(&self) {
        fence(Ordering::SeqCst);
        let depth = self.nesting.load(Ordering::Relaxed);
        assert!(depth > 0, "unlock without a matching lock");
        let lowered = depth - 1;
        self.nesting.store(lowered, Ordering::Relaxed);
        if lowered == 0 {
            self.pin.store(false, Ordering::Relaxed);
        }
    }

    /// Current nesting depth as last stored by the owning thread.
    #[must_use]
    pub fn depth(&self) -> u8 {
        self.nesting.load(Ordering::Relaxed)
    }

    /// Whether a quiescence announcement is pending on this reader.
    #[must_use]
    pub fn pinned(&self) -> bool {
        self.pin.load(Ordering::Relaxed)
    }

    /// Reclaimer side: request that the next outermost unlock announce a
    /// quiescent point by clearing the flag.
    pub(crate) fn request_pin(&self) {
        self.pin.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_unlock_tracks_depth() {
        let reader = Reader::new();
        assert_eq!(reader.depth(), 0);
        reader.lock();
        assert_eq!(reader.depth(), 1);
        reader.lock();
        assert_eq!(reader.depth(), 2);
        reader.unlock();
        assert_eq!(reader.depth(), 1);
        reader.unlock();
        assert_eq!(reader.depth(), 0);
    }

    #[test]
    fn pin_survives_nested_unlock() {
        let reader = Reader::new();
        reader.lock();
        reader.lock();
        reader.request_pin();
        reader.unlock();
        // Inner unlock must not announce quiescence.
        assert!(reader.pinned());
        reader.unlock();
        assert!(!reader.pinned());
    }

    #[test]
    fn pin_cleared_only_when_set_inside_section() {
        let reader = Reader::new();
        reader.request_pin();
        assert!(reader.pinned());
        reader.lock();
        reader.unlock();
        assert!(!reader.pinned());
    }

    #[test]
    fn relock_after_outermost_unlock_keeps_pin_clear() {
        let reader = Reader::new();
        reader.lock();
        reader.request_pin();
        reader.unlock();
        reader.lock();
        assert!(!reader.pinned());
        reader.unlock();
    }

    #[test]
    #[should_panic(expected = "unlock without a matching lock")]
    fn unlock_without_lock_panics() {
        let reader = Reader::new();
        reader.unlock();
    }

    #[test]
    #[should_panic(expected = "nesting overflow")]
    fn nesting_overflow_panics() {
        let reader = Reader::new();
        for _ in 0..=u8::MAX as usize {
            reader.lock();
        }
    }
}
