//! `LinkPvt`: engine-owned state of one attached link.
//!
//! Created by attach, mutated by protocol callbacks on the worker
//! threads, read by callers through the handle, and released only by the
//! worker that dispatches its `Clear` command.
//!
//! Locking: `data` guards the buffer and everything describing it. The
//! channel and subscription slots have their own mutexes so protocol
//! callbacks can look up the channel without touching the buffer. No
//! lock is held while a user callback runs.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dynlink_core::sync::lock;
use dynlink_core::{
    ChannelId, ControlInfo, DataType, Direction, LinkOptions, LinkState, Severity,
    SubscriptionId, Timestamp, Values,
};

use crate::handle::LinkHandle;
use crate::shared::Shared;

/// User callback. Always runs on a worker thread.
pub type LinkCallback = Arc<dyn Fn(&LinkHandle) + Send + Sync>;

/// Wrap a closure as a `LinkCallback`.
pub fn callback<F>(f: F) -> LinkCallback
where
    F: Fn(&LinkHandle) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Everything needed to attach a link.
pub struct LinkSpec {
    pub name: String,
    pub direction: Direction,
    pub data_type: DataType,
    pub options: LinkOptions,
    pub search_cb: Option<LinkCallback>,
    pub monitor_cb: Option<LinkCallback>,
}

/// Buffer and metadata, guarded by `LinkPvt::data`.
#[derive(Debug, Default)]
pub struct LinkData {
    /// Allocated once metadata arrives; dropped by teardown.
    pub buffer: Option<Values>,
    /// Remote element count at the last connection.
    pub element_count: usize,
    /// Elements moved by the next transfer.
    pub request_count: usize,
    pub timestamp: Timestamp,
    pub alarm_status: i16,
    pub severity: Severity,
    pub control: ControlInfo,
}

pub struct LinkPvt {
    shared: Arc<Shared>,
    name: String,
    direction: Direction,
    data_type: DataType,
    scalar: bool,
    state: AtomicU8,
    /// Cleared before the Clear command is queued; protocol callbacks
    /// that find it false do nothing.
    attached: AtomicBool,
    channel: Mutex<Option<ChannelId>>,
    subscription: Mutex<Option<SubscriptionId>>,
    search_cb: Option<LinkCallback>,
    monitor_cb: Option<LinkCallback>,
    notify_cb: Mutex<Option<LinkCallback>>,
    read_cb: Mutex<Option<LinkCallback>>,
    notify_in_progress: AtomicBool,
    data: Mutex<LinkData>,
}

impl LinkPvt {
    pub fn new(shared: Arc<Shared>, spec: LinkSpec) -> Self {
        // Outputs are never subscribed.
        let monitor_cb = match spec.direction {
            Direction::Input => spec.monitor_cb,
            Direction::Output => None,
        };
        Self {
            shared,
            name: spec.name,
            direction: spec.direction,
            data_type: spec.data_type,
            scalar: spec.options.scalar,
            state: AtomicU8::new(LinkState::Starting as u8),
            attached: AtomicBool::new(true),
            channel: Mutex::new(None),
            subscription: Mutex::new(None),
            search_cb: spec.search_cb,
            monitor_cb,
            notify_cb: Mutex::new(None),
            read_cb: Mutex::new(None),
            notify_in_progress: AtomicBool::new(false),
            data: Mutex::new(LinkData::default()),
        }
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_scalar(&self) -> bool {
        self.scalar
    }

    #[inline]
    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_state(&self, state: LinkState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    pub fn channel(&self) -> Option<ChannelId> {
        *lock(&self.channel)
    }

    /// Held across `connect()` so a connection event cannot observe the
    /// link before its channel id is recorded.
    pub(crate) fn lock_channel(&self) -> MutexGuard<'_, Option<ChannelId>> {
        lock(&self.channel)
    }

    pub(crate) fn lock_subscription(&self) -> MutexGuard<'_, Option<SubscriptionId>> {
        lock(&self.subscription)
    }

    pub fn lock_data(&self) -> MutexGuard<'_, LinkData> {
        lock(&self.data)
    }

    pub(crate) fn search_cb(&self) -> Option<&LinkCallback> {
        self.search_cb.as_ref()
    }

    pub(crate) fn monitor_cb(&self) -> Option<&LinkCallback> {
        self.monitor_cb.as_ref()
    }

    pub(crate) fn set_notify_cb(&self, cb: LinkCallback) {
        *lock(&self.notify_cb) = Some(cb);
    }

    pub(crate) fn take_notify_cb(&self) -> Option<LinkCallback> {
        lock(&self.notify_cb).take()
    }

    pub(crate) fn set_read_cb(&self, cb: LinkCallback) {
        *lock(&self.read_cb) = Some(cb);
    }

    pub(crate) fn take_read_cb(&self) -> Option<LinkCallback> {
        lock(&self.read_cb).take()
    }

    #[inline]
    pub fn notify_in_progress(&self) -> bool {
        self.notify_in_progress.load(Ordering::Acquire)
    }

    /// Claim the single acknowledged-write slot. False if already taken.
    pub(crate) fn claim_notify(&self) -> bool {
        self.notify_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release_notify(&self) {
        self.notify_in_progress.store(false, Ordering::Release);
    }

    /// Diagnostics gate: true when the configured verbosity exceeds `level`.
    #[inline]
    pub(crate) fn chatty(&self, level: u32) -> bool {
        self.shared.chatty(level)
    }
}
