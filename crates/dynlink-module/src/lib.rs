//! # dynlink-module: Default implementations
//!
//! This crate provides the default implementation for every dynlink
//! seam that is not the engine itself.
//!
//! ## Default stack
//!
//! | Trait          | Default Impl           | Alternative            |
//! |----------------|------------------------|------------------------|
//! | WakeSignal     | EventFdWake (Linux)    | CondvarWake (portable) |
//! | RemoteAccess   | SimService (in-process)| protocol clients       |

pub mod condvar_wake;
#[cfg(target_os = "linux")]
pub mod eventfd_wake;
pub mod sim_service;

pub use condvar_wake::CondvarWake;
#[cfg(target_os = "linux")]
pub use eventfd_wake::EventFdWake;
pub use sim_service::{Fault, SimService};

use dynlink_core::WakeSignal;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        /// Wake signal the engine uses when none is supplied.
        ///
        /// Falls back to `CondvarWake` if the eventfd cannot be created.
        pub fn default_wake() -> Box<dyn WakeSignal> {
            match EventFdWake::create() {
                Ok(w) => Box::new(w),
                Err(e) => {
                    tracing::warn!("eventfd unavailable ({}), using condvar wake signal", e);
                    Box::new(CondvarWake::new())
                }
            }
        }
    } else {
        /// Wake signal the engine uses when none is supplied.
        pub fn default_wake() -> Box<dyn WakeSignal> {
            Box::new(CondvarWake::new())
        }
    }
}
