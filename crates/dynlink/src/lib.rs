//! # dynlink - Dynamic link engine
//!
//! Lets real-time code read and write named remote data points without
//! ever blocking on network I/O. Callers attach a `LinkHandle` to a
//! point and issue operations that either read local state or queue a
//! command; two worker threads carry the commands to a `RemoteAccess`
//! service and deliver completions back through callbacks.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use dynlink::{callback, DataType, Engine, EngineConfig, LinkHandle, LinkOptions, SimService};
//!
//! let sim = SimService::new().shared();
//! sim.add_point("dev:valve1", dynlink::Values::Double(vec![0.0]));
//! let engine = Engine::new(sim, EngineConfig::from_env());
//!
//! let valve = LinkHandle::new();
//! engine.add_output(&valve, "dev:valve1", DataType::Double, LinkOptions::SCALAR,
//!     Some(callback(|h| println!("valve: {:?}", h.connection_status()))))?;
//!
//! // ... once connected:
//! valve.put_callback(&[42.0f64], callback(|h| println!("written, status {}", h.status())))?;
//! ```
//!
//! ## Operations
//!
//! | Operation            | Where                       | Blocks?            |
//! |----------------------|-----------------------------|--------------------|
//! | add_input/add_output | `Engine`                    | no (queues Search) |
//! | clear                | `LinkHandle::clear`         | bounded wait       |
//! | connection_status    | `LinkHandle`                | no                 |
//! | element_count, limits, precision, units | `LinkHandle` | short lock   |
//! | get                  | `LinkHandle::get`           | short lock         |
//! | get_callback         | `LinkHandle::get_callback`  | no                 |
//! | put / put_callback   | `LinkHandle::put*`          | short lock         |
//!
//! Callbacks always run on a worker thread.

pub mod engine;

pub use engine::{global, install, Engine};

pub use dynlink_core::{
    status, ConnectionState, ControlInfo, DataType, Direction, Element, EngineConfig,
    LinkError, LinkOptions, LinkState, RemoteAccess, Result, ServiceError, Severity,
    Timestamp, Values, WakeSignal,
};
pub use dynlink_executor::{callback, ClearOutcome, LinkCallback, LinkHandle, Reading};
pub use dynlink_module::{default_wake, CondvarWake, Fault, SimService};
