//! # dynlink-core: Types and traits for the dynamic link engine
//!
//! This crate defines the vocabulary every other dynlink crate speaks:
//! typed value buffers, link metadata, the `RemoteAccess` seam to the
//! network client, the `WakeSignal` seam for worker wake-ups, errors,
//! and configuration. It spawns no threads.
//!
//! ## Modules
//!
//! - `types` - Data types, value buffers, metadata, link state
//! - `service` - Remote Access Service trait and handler types
//! - `wake` - Worker wake signal trait
//! - `error` - Error enums and the integer status surface
//! - `config` - Engine configuration (defaults + env overrides)
//! - `env` - Environment variable helpers
//! - `sync` - Poison-tolerant lock helpers

pub mod types;
pub mod service;
pub mod wake;
pub mod error;
pub mod config;
pub mod env;
pub mod sync;

pub use types::{
    ConnectionState, ControlInfo, DataType, Direction, Element, LinkOptions, LinkState,
    Severity, TimedValues, Timestamp, Values,
};
pub use service::{
    ChannelId, ConnectionEvent, ConnectionHandler, ControlHandler, MonitorHandler,
    NotifyHandler, ReadHandler, RemoteAccess, SubscriptionId,
};
pub use wake::WakeSignal;
pub use error::{status, LinkError, Result, ServiceError, ServiceResult};
pub use config::EngineConfig;
