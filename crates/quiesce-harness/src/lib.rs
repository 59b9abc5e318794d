//! # quiesce-harness
//!
//! Stress and validation tooling for the `quiesce-core` RCU primitive.
//!
//! The harness drives the canonical validation workload: N reader threads
//! performing random lookups over a bounded keyspace while a single writer
//! toggles keys on the shared sorted list, batching unlinked nodes into
//! deferred reclamation callbacks. A run passes when every node the writer
//! ever unlinked has been freed exactly once by the reclaimer.

#![forbid(unsafe_code)]

pub mod stress;
