//! # dynlink-executor: Worker threads and link state
//!
//! Caller threads push `Command`s onto two bounded queues; one worker per
//! queue pops and dispatches them against the shared `RemoteAccess`
//! service, then pumps protocol events so the service's handlers run.
//!
//! ```text
//!  callers ──add/put──▶ [output queue] ──▶ output worker ─┐
//!  callers ──add/get──▶ [input queue]  ──▶ input worker  ─┼─▶ RemoteAccess
//!                                                          │
//!  user callbacks ◀── protocol handlers ◀── pump/pend ◀────┘
//! ```
//!
//! This crate owns no threads; `dynlink::Engine` spawns the loops.

pub mod command;
pub mod dispatch;
pub mod handle;
pub mod pending;
mod protocol;
pub mod pvt;
pub mod queue;
pub mod shared;
pub mod worker;

pub use command::{Command, LinkRef};
pub use handle::{attach, ClearOutcome, LinkHandle, Reading};
pub use pending::{PendingOps, PendingTicket};
pub use pvt::{callback, LinkCallback, LinkData, LinkPvt, LinkSpec};
pub use queue::CommandQueue;
pub use shared::Shared;
pub use worker::{input_loop, output_loop};
