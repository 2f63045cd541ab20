//! Remote Access Service abstraction.
//!
//! A `RemoteAccess` is the network client that actually reaches named
//! remote data points: resolve/connect, subscribe, get, put,
//! put-with-acknowledgement and flush. The engine never talks to the
//! wire directly; both worker threads share one `Arc<dyn RemoteAccess>`,
//! which is the single connection context.
//!
//! # Implementors
//!
//! - `SimService` (dynlink-module): in-process service backed by a table
//!   of simulated points. Used by tests and the smoke binary.
//! - Protocol clients live outside this workspace and plug in here.

use std::time::Duration;

use crate::error::ServiceResult;
use crate::types::{ConnectionState, ControlInfo, DataType, TimedValues, Values};

/// Opaque channel identifier handed out by `connect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ChannelId(pub u64);

/// Opaque subscription identifier handed out by `subscribe()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SubscriptionId(pub u64);

/// Connectivity change reported to a connection handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Up,
    Down,
}

/// Called on every connectivity change of a channel.
pub type ConnectionHandler = Box<dyn Fn(ConnectionEvent) + Send + Sync>;
/// Completion of a metadata fetch.
pub type ControlHandler = Box<dyn FnOnce(ServiceResult<ControlInfo>) + Send>;
/// Called for every update on a subscription.
pub type MonitorHandler = Box<dyn Fn(ServiceResult<&TimedValues>) + Send + Sync>;
/// Completion of a read-with-acknowledgement.
pub type ReadHandler = Box<dyn FnOnce(ServiceResult<TimedValues>) + Send>;
/// Completion of a write-with-acknowledgement.
pub type NotifyHandler = Box<dyn FnOnce(ServiceResult<()>) + Send>;

/// The network data-access client consumed by the engine.
///
/// **Contract:**
/// - Request methods (`connect`, `subscribe`, `get_*`, `put*`) must not
///   block on the network. A returned `Err` means the request was never
///   issued and its handler will never run.
/// - Handlers run on whichever worker thread is inside `pump_events()`,
///   `pend_io()` or `flush_outgoing()`, never on a caller thread.
/// - Every completion is a `Result`: a handler must match the status
///   before it can reach the payload.
pub trait RemoteAccess: Send + Sync {
    /// Start resolving `name`. `on_connection` fires on every
    /// connectivity change until `disconnect()`.
    fn connect(
        &self,
        name: &str,
        on_connection: ConnectionHandler,
        timeout: Duration,
    ) -> ServiceResult<ChannelId>;

    /// True if `name` is served by this process rather than a remote
    /// peer. Must not block.
    fn resolves_locally(&self, name: &str) -> bool;

    /// Drop the channel and every subscription on it.
    fn disconnect(&self, channel: ChannelId) -> ServiceResult<()>;

    /// Fetch display/control metadata.
    fn get_control(&self, channel: ChannelId, on_done: ControlHandler) -> ServiceResult<()>;

    fn subscribe(
        &self,
        channel: ChannelId,
        data_type: DataType,
        count: usize,
        on_update: MonitorHandler,
    ) -> ServiceResult<SubscriptionId>;

    fn get_with_callback(
        &self,
        channel: ChannelId,
        data_type: DataType,
        count: usize,
        on_done: ReadHandler,
    ) -> ServiceResult<()>;

    /// Fire-and-forget write.
    fn put(&self, channel: ChannelId, values: &Values) -> ServiceResult<()>;

    fn put_with_callback(
        &self,
        channel: ChannelId,
        values: &Values,
        on_done: NotifyHandler,
    ) -> ServiceResult<()>;

    /// Native element count of the remote point (0 if unknown).
    fn element_count(&self, channel: ChannelId) -> usize;

    fn connection_state(&self, channel: ChannelId) -> ConnectionState;

    /// Deliver pending events, waiting up to `timeout` for one to arrive.
    fn pump_events(&self, timeout: Duration) -> ServiceResult<()>;

    /// Wait up to `timeout` for outstanding reads to complete.
    fn pend_io(&self, timeout: Duration) -> ServiceResult<()>;

    /// Push buffered outgoing requests onto the wire.
    fn flush_outgoing(&self) -> ServiceResult<()>;
}
