//! Recoverable error types for the controller surface.
//!
//! Only allocation-shaped failures are recoverable: registry/queue growth
//! and reclaimer-thread creation. Protocol misuse (double registration,
//! unbalanced lock/unlock, concurrent writers) is fatal and panics at the
//! point of detection rather than surfacing here.

use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

/// Errors returned by the fallible controller operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The tracker registry or a callback queue could not grow.
    #[error("reservation failed: {0}")]
    Reserve(#[from] TryReserveError),
    /// The reclaimer thread could not be spawned.
    #[error("failed to spawn reclaimer thread: {0}")]
    Spawn(#[from] io::Error),
}
