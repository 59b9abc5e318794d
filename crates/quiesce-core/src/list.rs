//! Single-writer sorted linked list with lock-free reader lookup.
//!
//! A singly-linked chain of unique `u32` keys in ascending order. The one
//! writer mutates in place: insertion allocates a fully initialized node and
//! publishes it with a release store; removal bypasses the node with a
//! single store and hands it back for deferred destruction. Readers walk
//! the chain with acquire loads inside a read section, so a reader that
//! observes a new node also observes its initialized successor pointer.
//!
//! An unlinked node stays valid memory until a grace period elapses;
//! readers that already reached it simply continue through its stale
//! successor pointer. Freeing it before the grace period is the
//! use-after-free this whole crate exists to prevent.

#![allow(unsafe_code)]

use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

use crate::error::Error;
use crate::rcu::Rcu;

/// One node in the chain. Allocated by the writer, reclaimed only after a
/// grace period has elapsed past its unlink.
#[derive(Debug)]
pub struct ListNode {
    value: u32,
    next: AtomicPtr<ListNode>,
}

impl ListNode {
    /// The key stored in this node.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Reclamation callback for a single unlinked node, shaped for
    /// [`crate::Rcu::call`]: `arg` is the address of a node returned by
    /// [`Toggle::Removed`] whose grace period has elapsed. Frees the node.
    ///
    /// The pointer must originate from [`List::toggle`] and must not be
    /// reclaimed twice.
    pub fn reclaim(arg: usize) {
        // SAFETY: contract above — `arg` is a Box-allocated node unlinked by
        // the writer, past its grace period, and not yet freed.
        drop(unsafe { Box::from_raw(arg as *mut ListNode) });
    }
}

/// Outcome of a [`List::toggle`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum Toggle {
    /// The key was absent and has been inserted.
    Inserted,
    /// The key was present; the node has been unlinked and is returned.
    /// The caller must defer its destruction past a grace period.
    Removed(NonNull<ListNode>),
}

/// Sorted-unique list head. Lookup is callable from any reader inside a
/// read section; `toggle` assumes a single writer and panics on overlap.
#[derive(Debug)]
pub struct List {
    head: AtomicPtr<ListNode>,
    /// Single-writer assertion: raised for the duration of each `toggle`.
    writer_active: AtomicBool,
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl List {
    /// New empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            writer_active: AtomicBool::new(false),
        }
    }

    /// Insert `value` if absent, unlink it if present.
    ///
    /// Writer-only. Traversal uses relaxed loads; the insertion store is
    /// release so that concurrent `lookup` acquire loads observe the new
    /// node fully initialized. The unlink store needs no ordering of its
    /// own: the bypassed node remains valid until its grace period ends.
    ///
    /// # Panics
    ///
    /// Panics if another `toggle` is in flight. The list supports exactly
    /// one writer; serialize writers externally before generalizing.
    pub fn toggle(&self, value: u32) -> Toggle {
        let claimed = self
            .writer_active
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok();
        assert!(claimed, "concurrent toggle: the list supports a single writer");

        let mut slot: &AtomicPtr<ListNode> = &self.head;
        let outcome = loop {
            let current = slot.load(Ordering::Relaxed);
            let Some(node) = (
                // SAFETY: every non-null pointer reachable from `head` was
                // published by this writer and is not freed before a grace
                // period; the writer is the only mutator.
                unsafe { current.as_ref() }
            ) else {
                publish(slot, value, current);
                break Toggle::Inserted;
            };
            if node.value > value {
                publish(slot, value, current);
                break Toggle::Inserted;
            }
            if node.value == value {
                let successor = node.next.load(Ordering::Relaxed);
                slot.store(successor, Ordering::Relaxed);
                // SAFETY: `current` is non-null (`node` was derived from it).
                break Toggle::Removed(unsafe { NonNull::new_unchecked(current) });
            }
            slot = &node.next;
        };

        self.writer_active.store(false, Ordering::Release);
        outcome
    }

    /// Whether `value` is currently reachable. Callable concurrently with
    /// the writer from inside a read section.
    #[must_use]
    pub fn lookup(&self, value: u32) -> bool {
        let mut current = self.head.load(Ordering::Acquire);
        while let Some(node) =
            // SAFETY: the caller is inside a read section, so every node
            // reachable here is either linked or unlinked-but-unreclaimed.
            (unsafe { current.as_ref() })
        {
            if node.value == value {
                return true;
            }
            if node.value > value {
                return false;
            }
            current = node.next.load(Ordering::Acquire);
        }
        false
    }

    /// Snapshot of the key sequence in list order.
    ///
    /// Writer-only (or externally quiesced): the relaxed walk is not
    /// synchronized against concurrent insertion.
    #[must_use]
    pub fn keys(&self) -> Vec<u32> {
        let mut keys = Vec::new();
        let mut current = self.head.load(Ordering::Relaxed);
        // SAFETY: single-writer walk over nodes this writer published.
        while let Some(node) = unsafe { current.as_ref() } {
            keys.push(node.value);
            current = node.next.load(Ordering::Relaxed);
        }
        keys
    }
}

impl Drop for List {
    fn drop(&mut self) {
        let mut current = *self.head.get_mut();
        while !current.is_null() {
            // SAFETY: `&mut self` guarantees no concurrent access; every
            // node still reachable from `head` is owned by the list.
            let node = unsafe { Box::from_raw(current) };
            current = node.next.load(Ordering::Relaxed);
        }
    }
}

/// Link a freshly allocated node for `value` into `slot`, ahead of
/// `successor`. The release store is the publication point.
fn publish(slot: &AtomicPtr<ListNode>, value: u32, successor: *mut ListNode) {
    let node = Box::into_raw(Box::new(ListNode {
        value,
        next: AtomicPtr::new(successor),
    }));
    slot.store(node, Ordering::Release);
}

/// A batch of unlinked nodes bound for one deferred reclamation callback.
///
/// The writer accumulates [`Toggle::Removed`] nodes here, then erases the
/// batch with [`NodeBatch::into_arg`] and enqueues [`NodeBatch::reclaim`]
/// via [`crate::Rcu::call`]. Invocation frees every node and adds the batch
/// size to the shared counter, so a harness can prove every unlinked node
/// was freed exactly once.
#[derive(Debug)]
pub struct NodeBatch {
    nodes: Vec<NonNull<ListNode>>,
    freed: Arc<AtomicU64>,
}

impl NodeBatch {
    /// New empty batch reporting into `freed`.
    #[must_use]
    pub fn new(freed: Arc<AtomicU64>) -> Self {
        Self {
            nodes: Vec::new(),
            freed,
        }
    }

    /// Add an unlinked node to the batch.
    pub fn push(&mut self, node: NonNull<ListNode>) {
        self.nodes.push(node);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Erase the batch into a callback argument for [`crate::Rcu::call`].
    /// The batch (and its nodes) leak unless `reclaim` is eventually
    /// invoked with the returned value.
    #[must_use]
    pub fn into_arg(self) -> usize {
        Box::into_raw(Box::new(self)) as usize
    }

    /// Hand the batch to the reclaimer: every node is freed after a full
    /// grace period relative to this call. If the enqueue itself fails the
    /// batch leaks; its nodes may still be visible to readers and cannot
    /// be freed here.
    pub fn enqueue(self, rcu: &Rcu) -> Result<(), Error> {
        // SAFETY: the erased arg is produced here and consumed exactly once
        // by `reclaim`; the batch uniquely owns its unlinked nodes.
        unsafe { rcu.call(Self::reclaim, self.into_arg()) }
    }

    /// Reclamation callback: frees every node in the batch produced by
    /// [`NodeBatch::into_arg`] and bumps the shared counter.
    pub fn reclaim(arg: usize) {
        // SAFETY: contract — `arg` came from `into_arg` and is consumed
        // exactly once, after the nodes' grace period has elapsed.
        let batch = unsafe { Box::from_raw(arg as *mut NodeBatch) };
        let count = batch.nodes.len() as u64;
        for node in &batch.nodes {
            // SAFETY: each node was unlinked by the writer and is freed
            // only here.
            drop(unsafe { Box::from_raw(node.as_ptr()) });
        }
        batch.freed.fetch_add(count, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn removed(toggle: Toggle) -> NonNull<ListNode> {
        match toggle {
            Toggle::Removed(node) => node,
            Toggle::Inserted => panic!("expected removal, key was absent"),
        }
    }

    #[test]
    fn toggle_inserts_then_removes() {
        let list = List::new();
        assert!(!list.lookup(5));
        assert_eq!(list.toggle(5), Toggle::Inserted);
        assert!(list.lookup(5));
        let node = removed(list.toggle(5));
        assert!(!list.lookup(5));
        // SAFETY: no readers exist; the grace period is trivially over.
        assert_eq!(unsafe { node.as_ref() }.value(), 5);
        ListNode::reclaim(node.as_ptr() as usize);
    }

    #[test]
    fn keys_stay_sorted_and_unique() {
        let list = List::new();
        for value in [3, 1, 4, 1, 5] {
            list.toggle(value);
        }
        // The two toggles of 1 cancel.
        assert_eq!(list.keys(), vec![3, 4, 5]);
        assert!(list.lookup(3));
        assert!(!list.lookup(1));
    }

    #[test]
    fn lookup_misses_between_keys() {
        let list = List::new();
        for value in [10, 20, 30] {
            list.toggle(value);
        }
        assert!(!list.lookup(0));
        assert!(!list.lookup(15));
        assert!(!list.lookup(40));
        assert!(list.lookup(20));
    }

    #[test]
    fn remove_head_and_tail() {
        let list = List::new();
        for value in [1, 2, 3] {
            list.toggle(value);
        }
        ListNode::reclaim(removed(list.toggle(1)).as_ptr() as usize);
        assert_eq!(list.keys(), vec![2, 3]);
        ListNode::reclaim(removed(list.toggle(3)).as_ptr() as usize);
        assert_eq!(list.keys(), vec![2]);
    }

    #[test]
    fn reinsert_after_remove() {
        let list = List::new();
        list.toggle(7);
        ListNode::reclaim(removed(list.toggle(7)).as_ptr() as usize);
        assert_eq!(list.toggle(7), Toggle::Inserted);
        assert!(list.lookup(7));
    }

    #[test]
    fn drop_frees_remaining_nodes() {
        let list = List::new();
        for value in 0..64 {
            list.toggle(value);
        }
        drop(list);
    }

    #[test]
    fn batch_reclaims_and_counts() {
        let list = List::new();
        for value in 0..8 {
            list.toggle(value);
        }
        let freed = Arc::new(AtomicU64::new(0));
        let mut batch = NodeBatch::new(Arc::clone(&freed));
        for value in 0..8 {
            batch.push(removed(list.toggle(value)));
        }
        assert_eq!(batch.len(), 8);
        NodeBatch::reclaim(batch.into_arg());
        assert_eq!(freed.load(Ordering::Relaxed), 8);
        assert!(list.keys().is_empty());
    }
}
