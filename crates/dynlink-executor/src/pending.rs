//! Per-handle pending-operation set.
//!
//! Every command enqueued for a handle owns a `PendingTicket`. The ticket
//! is registered in the handle's `PendingOps` when issued and removed when
//! dropped, so each enqueued command is released exactly once whether it
//! is dispatched, skipped, rejected, or rolled back after a full queue.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dynlink_core::sync::lock;

#[derive(Debug, Default)]
pub struct PendingOps {
    next_id: AtomicU64,
    live: Mutex<HashSet<u64>>,
}

impl PendingOps {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new outstanding operation.
    pub fn issue(self: &Arc<Self>) -> PendingTicket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.live).insert(id);
        PendingTicket { ops: Arc::clone(self), id }
    }

    pub fn len(&self) -> usize {
        lock(&self.live).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.live).is_empty()
    }
}

/// Proof that one command is outstanding. Dropping it releases the slot.
#[derive(Debug)]
pub struct PendingTicket {
    ops: Arc<PendingOps>,
    id: u64,
}

impl PendingTicket {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for PendingTicket {
    fn drop(&mut self) {
        lock(&self.ops.live).remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_release_on_drop() {
        let ops = PendingOps::new();
        let a = ops.issue();
        let b = ops.issue();
        assert_ne!(a.id(), b.id());
        assert_eq!(ops.len(), 2);
        drop(a);
        assert_eq!(ops.len(), 1);
        drop(b);
        assert!(ops.is_empty());
    }

    #[test]
    fn test_tickets_across_threads() {
        let ops = PendingOps::new();
        let tickets: Vec<_> = (0..16).map(|_| ops.issue()).collect();
        let handles: Vec<_> = tickets
            .into_iter()
            .map(|t| std::thread::spawn(move || drop(t)))
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(ops.is_empty());
    }
}
