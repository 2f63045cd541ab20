//! The two worker loops.
//!
//! ```text
//! input worker                          output worker
//! loop {                                loop {
//!     drain input queue                     wait on wake signal (timeout)
//!     reap deferred clears                  drain output queue
//!     read issued? pend_io                  reap deferred clears
//!                : pump_events              flush outgoing
//! }                                         pump_events(0) if enabled
//!                                       }
//! ```
//!
//! Queues are drained only while the engine accepts work. Both loops
//! return once shutdown begins.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use dynlink_core::Direction;

use crate::dispatch::dispatch;
use crate::shared::Shared;

/// Dispatch queued commands for `direction`, at most one queue's worth.
/// Returns true if a read-with-acknowledgement was issued.
pub(crate) fn drain(shared: &Shared, direction: Direction) -> bool {
    if !shared.is_accepting() {
        return false;
    }
    let queue = shared.queue(direction);
    let mut read_issued = false;
    for _ in 0..queue.capacity() {
        if shared.is_shutting_down() {
            break;
        }
        match queue.pop() {
            Some(cmd) => read_issued |= dispatch(shared, cmd),
            None => break,
        }
    }
    read_issued
}

pub fn input_loop(shared: &Shared) {
    let config = shared.config();
    if shared.chatty(0) {
        debug!("input worker started");
    }
    while !shared.is_shutting_down() {
        let read_issued = drain(shared, Direction::Input);
        shared.reap_deferred();

        let pumped = if read_issued {
            shared.service().pend_io(config.input_pend_io_time)
        } else if config.input_pend_event {
            shared.service().pump_events(config.input_pend_event_time)
        } else {
            thread::sleep(config.input_pend_event_time);
            Ok(())
        };
        if let Err(e) = pumped {
            warn!("input event pump: {}", e);
        }
    }
    if shared.chatty(0) {
        debug!("input worker stopped");
    }
}

pub fn output_loop(shared: &Shared) {
    let config = shared.config();
    if shared.chatty(0) {
        debug!("output worker started");
    }
    while !shared.is_shutting_down() {
        shared.wake().wait(config.output_wake_timeout);
        if shared.is_shutting_down() {
            break;
        }
        drain(shared, Direction::Output);
        shared.reap_deferred();

        if config.output_flush {
            if let Err(e) = shared.service().flush_outgoing() {
                warn!("output flush: {}", e);
            }
        }
        if config.output_pend {
            if let Err(e) = shared.service().pump_events(Duration::ZERO) {
                warn!("output event pump: {}", e);
            }
        }
    }
    if shared.chatty(0) {
        debug!("output worker stopped");
    }
}
