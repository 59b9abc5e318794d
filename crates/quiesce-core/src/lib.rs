//! # quiesce-core
//!
//! A userspace Read-Copy-Update (RCU) primitive: a single writer publishes
//! and retracts shared data concurrently with many readers, and destruction
//! of retracted data is deferred until no reader can still observe it.
//!
//! The crate has three parts:
//!
//! - [`Reader`]: per-thread read-side state with lock-free `lock`/`unlock`
//!   critical-section brackets.
//! - [`Rcu`]: the controller — reader registry, deferred-callback queues,
//!   and a background reclaimer that detects grace periods and invokes
//!   callbacks once quiescence is proven.
//! - [`List`]: a single-writer sorted linked list of `u32` keys used to
//!   validate the primitive under concurrent readers.
//!
//! No `unsafe` code is permitted at the crate level; the modules that manage
//! raw node pointers and erased callback arguments opt back in locally and
//! document every unsafe block.

#![deny(unsafe_code)]

mod error;
mod event;
#[allow(unsafe_code)]
mod list;
mod reader;
#[allow(unsafe_code)]
mod rcu;

pub use error::Error;
pub use list::{List, ListNode, NodeBatch, Toggle};
pub use rcu::{RECLAIM_TICK, Rcu, ReclaimFn};
pub use reader::Reader;
