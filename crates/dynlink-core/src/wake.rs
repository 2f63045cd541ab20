//! Wake signal abstraction.
//!
//! A `WakeSignal` lets callers pulse the output worker out of its timed
//! wait as soon as new commands are queued.
//!
//! # Implementors
//!
//! - `EventFdWake` (Linux default): writes 1 to an eventfd, waits with
//!   `poll(2)`. Multiple signals before the waiter wakes coalesce.
//! - `CondvarWake` (portable): a flag guarded by a mutex + condvar.

use std::time::Duration;

/// Wakes a worker blocked in `wait()`.
///
/// **Contract:**
/// - `signal()` must NEVER block.
/// - Signals raised before `wait()` is entered are not lost: the next
///   `wait()` returns immediately.
/// - Multiple signals before the waiter wakes are coalesced.
pub trait WakeSignal: Send + Sync {
    fn signal(&self);

    /// Block until signalled or `timeout` elapses. Returns true if
    /// woken by a signal.
    fn wait(&self, timeout: Duration) -> bool;
}
