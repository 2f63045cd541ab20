//! Bounded command queue.
//!
//! Lock-free MPMC queue: any number of caller threads push, one worker
//! pops. Pushing never blocks; a full queue hands the command back.

use crossbeam_queue::ArrayQueue;

use crate::command::Command;

pub struct CommandQueue {
    name: &'static str,
    queue: ArrayQueue<Command>,
}

impl CommandQueue {
    /// `depth` is clamped to at least 1.
    pub fn new(name: &'static str, depth: usize) -> Self {
        Self { name, queue: ArrayQueue::new(depth.max(1)) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the command back if the queue is full.
    #[inline]
    pub fn push(&self, cmd: Command) -> Result<(), Command> {
        self.queue.push(cmd)
    }

    #[inline]
    pub fn pop(&self) -> Option<Command> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}
