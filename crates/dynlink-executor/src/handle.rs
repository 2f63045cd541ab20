//! `LinkHandle`: the caller-side view of a link.
//!
//! A handle is cheap to clone; clones share one attachment. Every
//! operation either reads private state under its lock or queues a
//! command and returns. None of them waits on the network.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use dynlink_core::sync::lock;
use dynlink_core::{
    status, ConnectionState, Direction, Element, LinkError, LinkState, Result, Severity,
    Timestamp,
};

use crate::command::{Command, LinkRef};
use crate::pending::PendingOps;
use crate::pvt::{LinkCallback, LinkPvt, LinkSpec};
use crate::shared::Shared;

/// How `clear()` settled the link's outstanding commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// Nothing was outstanding.
    Immediate,
    /// Outstanding commands finished within the wait.
    Drained,
    /// Commands were still counted but the queue was empty, so they had
    /// already been dispatched.
    Stale,
    /// Commands were still queued; teardown was queued behind them anyway.
    Abandoned,
}

impl ClearOutcome {
    pub fn code(self) -> i64 {
        match self {
            ClearOutcome::Abandoned => status::ABANDONED,
            _ => status::OK,
        }
    }
}

/// Result of a synchronous `get`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Elements written to the caller's buffer.
    pub count: usize,
    pub timestamp: Timestamp,
    pub alarm_status: i16,
    pub severity: Severity,
}

struct HandleInner {
    pvt: Mutex<Option<Arc<LinkPvt>>>,
    status: AtomicI64,
    pending: Arc<PendingOps>,
    read_callback_pending: AtomicBool,
}

#[derive(Clone)]
pub struct LinkHandle {
    inner: Arc<HandleInner>,
}

impl Default for LinkHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkHandle")
            .field("name", &self.name())
            .field("status", &self.status())
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

impl LinkHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                pvt: Mutex::new(None),
                status: AtomicI64::new(status::OK),
                pending: PendingOps::new(),
                read_callback_pending: AtomicBool::new(false),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Attachment
    // ------------------------------------------------------------------

    pub(crate) fn pvt(&self) -> Option<Arc<LinkPvt>> {
        lock(&self.inner.pvt).clone()
    }

    pub(crate) fn install(&self, pvt: Arc<LinkPvt>) {
        *lock(&self.inner.pvt) = Some(pvt);
    }

    fn take_pvt(&self) -> Option<Arc<LinkPvt>> {
        lock(&self.inner.pvt).take()
    }

    pub(crate) fn pending(&self) -> &Arc<PendingOps> {
        &self.inner.pending
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.inner.pvt).is_some()
    }

    pub fn name(&self) -> Option<String> {
        self.pvt().map(|p| p.name().to_string())
    }

    pub fn direction(&self) -> Option<Direction> {
        self.pvt().map(|p| p.direction())
    }

    pub fn link_state(&self) -> Option<LinkState> {
        self.pvt().map(|p| p.state())
    }

    // ------------------------------------------------------------------
    // Status words
    // ------------------------------------------------------------------

    /// Status of the last completion delivered to this handle.
    pub fn status(&self) -> i64 {
        self.inner.status.load(Ordering::Acquire)
    }

    pub(crate) fn set_status(&self, code: i64) {
        self.inner.status.store(code, Ordering::Release);
    }

    /// Commands queued for this handle and not yet dispatched.
    pub fn in_flight_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn read_callback_pending(&self) -> bool {
        self.inner.read_callback_pending.load(Ordering::Acquire)
    }

    pub(crate) fn set_read_callback_pending(&self, pending: bool) {
        self.inner.read_callback_pending.store(pending, Ordering::Release);
    }

    pub fn notify_in_progress(&self) -> bool {
        self.pvt().map_or(false, |p| p.notify_in_progress())
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Detach the link and queue its teardown.
    ///
    /// The handle is detached before this returns and may be reattached
    /// at once. If commands for the link are still outstanding, waits a
    /// bounded time for them, then queues teardown regardless.
    pub fn clear(&self) -> Result<ClearOutcome> {
        let pvt = self.take_pvt().ok_or(LinkError::NotAttached)?;
        pvt.detach();

        let shared = Arc::clone(pvt.shared());
        let outcome = self.settle_pending(&shared, &pvt);
        if outcome == ClearOutcome::Abandoned {
            warn!(
                link = pvt.name(),
                in_flight = self.in_flight_count(),
                "abandoning queued action on '{}'",
                pvt.name()
            );
        } else if shared.chatty(10) {
            debug!(link = pvt.name(), ?outcome, "clear");
        }

        self.set_read_callback_pending(false);
        shared.enqueue_clear(pvt);
        self.set_status(status::OK);
        Ok(outcome)
    }

    fn settle_pending(&self, shared: &Shared, pvt: &LinkPvt) -> ClearOutcome {
        if self.inner.pending.is_empty() {
            return ClearOutcome::Immediate;
        }
        let config = shared.config();
        for _ in 0..config.clear_retries {
            shared.wake().signal();
            std::thread::sleep(config.clear_retry_sleep);
            if self.inner.pending.is_empty() {
                return ClearOutcome::Drained;
            }
        }
        if shared.queue(pvt.direction()).is_empty() {
            ClearOutcome::Stale
        } else {
            ClearOutcome::Abandoned
        }
    }

    // ------------------------------------------------------------------
    // Synchronous readers
    // ------------------------------------------------------------------

    fn connected(&self) -> Result<Arc<LinkPvt>> {
        let pvt = self.pvt().ok_or(LinkError::NotAttached)?;
        if pvt.state() != LinkState::Connected {
            return Err(LinkError::NotConnected);
        }
        Ok(pvt)
    }

    pub fn connection_status(&self) -> ConnectionState {
        let Some(pvt) = self.pvt() else {
            return ConnectionState::NotConnected;
        };
        match pvt.channel() {
            Some(ch) if pvt.state() == LinkState::Connected => {
                pvt.shared().service().connection_state(ch)
            }
            _ => ConnectionState::NotConnected,
        }
    }

    pub fn element_count(&self) -> Result<usize> {
        Ok(self.connected()?.lock_data().element_count)
    }

    /// `(low, high)` control limits.
    pub fn control_limits(&self) -> Result<(f64, f64)> {
        let pvt = self.connected()?;
        let data = pvt.lock_data();
        Ok((data.control.control_low, data.control.control_high))
    }

    /// `(low, high)` display limits.
    pub fn graphic_limits(&self) -> Result<(f64, f64)> {
        let pvt = self.connected()?;
        let data = pvt.lock_data();
        Ok((data.control.graphic_low, data.control.graphic_high))
    }

    pub fn precision(&self) -> Result<i16> {
        Ok(self.connected()?.lock_data().control.precision)
    }

    pub fn units(&self) -> Result<String> {
        Ok(self.connected()?.lock_data().control.units.clone())
    }

    /// Copy the latest buffered value into `out`.
    ///
    /// The count is clamped to the link's request count and to
    /// `out.len()`; the clamp is reported only through `Reading::count`.
    /// Nothing is written on error.
    pub fn get<T: Element>(&self, out: &mut [T]) -> Result<Reading> {
        let pvt = self.connected()?;
        if !T::matches(pvt.data_type()) {
            return Err(LinkError::TypeMismatch(pvt.data_type().name()));
        }
        let data = pvt.lock_data();
        let buffer = data.buffer.as_ref().ok_or(LinkError::NotConnected)?;
        let src = T::slice(buffer).ok_or(LinkError::NotConnected)?;
        let n = data.request_count.min(src.len()).min(out.len());
        out[..n].clone_from_slice(&src[..n]);
        Ok(Reading {
            count: n,
            timestamp: data.timestamp,
            alarm_status: data.alarm_status,
            severity: data.severity,
        })
    }

    // ------------------------------------------------------------------
    // Queued operations
    // ------------------------------------------------------------------

    /// Queue a read-with-acknowledgement of `count` elements.
    ///
    /// `read_cb` runs once on the input worker after the value has been
    /// stored; `get()` then returns it. Returns the clamped count.
    pub fn get_callback(&self, count: usize, read_cb: LinkCallback) -> Result<usize> {
        let pvt = self.connected()?;
        if pvt.direction() != Direction::Input {
            return Err(LinkError::WrongDirection("output"));
        }
        let channel = pvt.channel().ok_or(LinkError::NotConnected)?;
        if pvt.shared().service().connection_state(channel) != ConnectionState::Connected {
            return Err(LinkError::NotConnected);
        }
        let count = {
            let mut data = pvt.lock_data();
            let mut n = count.min(data.element_count);
            if pvt.is_scalar() {
                n = n.min(1);
            }
            data.request_count = n;
            n
        };

        pvt.set_read_cb(read_cb);
        self.set_read_callback_pending(true);
        let cmd = Command::GetCallback(LinkRef::new(self, &pvt));
        if let Err(e) = pvt.shared().enqueue(Direction::Input, cmd) {
            self.set_read_callback_pending(false);
            pvt.take_read_cb();
            return Err(e);
        }
        Ok(count)
    }

    /// Queue a write of `data`. Returns the clamped element count.
    pub fn put<T: Element>(&self, data: &[T]) -> Result<usize> {
        self.queue_put(data, None)
    }

    /// Queue an acknowledged write. `notify_cb` runs once on a worker when
    /// the write completes or fails.
    ///
    /// Only one acknowledged write may be outstanding per link; a second
    /// one fails with `NotifyInProgress` and changes nothing.
    pub fn put_callback<T: Element>(&self, data: &[T], notify_cb: LinkCallback) -> Result<usize> {
        self.queue_put(data, Some(notify_cb))
    }

    fn queue_put<T: Element>(&self, data: &[T], notify_cb: Option<LinkCallback>) -> Result<usize> {
        let pvt = self.connected()?;
        if pvt.direction() != Direction::Output {
            return Err(LinkError::WrongDirection("input"));
        }
        if !T::matches(pvt.data_type()) {
            return Err(LinkError::TypeMismatch(pvt.data_type().name()));
        }
        let values = T::to_values(data, pvt.data_type())
            .ok_or(LinkError::TypeMismatch(pvt.data_type().name()))?;
        if notify_cb.is_some() && !pvt.claim_notify() {
            return Err(LinkError::NotifyInProgress);
        }

        let count = {
            let mut link_data = pvt.lock_data();
            let mut n = data.len().min(link_data.element_count);
            if pvt.is_scalar() {
                n = n.min(1);
            }
            if let Some(buf) = link_data.buffer.as_mut() {
                buf.copy_prefix_from(&values, n);
            }
            link_data.request_count = n;
            n
        };

        let link = LinkRef::new(self, &pvt);
        let cmd = match notify_cb {
            Some(cb) => {
                pvt.set_notify_cb(cb);
                Command::PutCallback(link)
            }
            None => Command::Put(link),
        };
        let notify = matches!(cmd, Command::PutCallback(_));
        if let Err(e) = pvt.shared().enqueue(Direction::Output, cmd) {
            if notify {
                pvt.take_notify_cb();
                pvt.release_notify();
            }
            return Err(e);
        }
        Ok(count)
    }
}

/// Attach `handle` to a new link and queue its search.
///
/// An attached handle is cleared first. On failure the handle is left
/// detached.
pub fn attach(shared: &Arc<Shared>, handle: &LinkHandle, spec: LinkSpec) -> Result<()> {
    if spec.name.trim().is_empty() {
        return Err(LinkError::EmptyName);
    }
    if shared.is_shutting_down() {
        return Err(LinkError::ShuttingDown);
    }
    if spec.options.local_only && !shared.service().resolves_locally(&spec.name) {
        return Err(LinkError::NotLocal(spec.name));
    }
    if handle.is_attached() {
        handle.clear()?;
    }

    let direction = spec.direction;
    let pvt = Arc::new(LinkPvt::new(Arc::clone(shared), spec));
    handle.install(Arc::clone(&pvt));
    handle.set_status(status::OK);
    if shared.chatty(10) {
        debug!(link = pvt.name(), ?direction, "attach");
    }

    let cmd = Command::Search(LinkRef::new(handle, &pvt));
    if let Err(e) = shared.enqueue(direction, cmd) {
        // Never reached the service; nothing for a worker to tear down.
        pvt.detach();
        handle.take_pvt();
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvt::callback;
    use dynlink_core::{DataType, EngineConfig, LinkOptions, RemoteAccess, Values};
    use dynlink_module::{CondvarWake, SimService};
    use std::time::Duration;

    fn shared_with(sim: &Arc<SimService>, config: EngineConfig) -> Arc<Shared> {
        let service: Arc<dyn RemoteAccess> = sim.clone();
        Shared::new(service, Box::new(CondvarWake::new()), config)
    }

    fn spec(name: &str, direction: Direction) -> LinkSpec {
        LinkSpec {
            name: name.to_string(),
            direction,
            data_type: DataType::Double,
            options: LinkOptions::default(),
            search_cb: None,
            monitor_cb: None,
        }
    }

    /// Run every queued command and deliver every event, as the workers
    /// would.
    fn run_workers(shared: &Shared, sim: &SimService) {
        for _ in 0..4 {
            for dir in [Direction::Input, Direction::Output] {
                while let Some(cmd) = shared.queue(dir).pop() {
                    crate::dispatch::dispatch(shared, cmd);
                }
            }
            sim.pump_events(Duration::ZERO).unwrap();
        }
    }

    #[test]
    fn test_attach_rejects_empty_name() {
        let sim = SimService::new().shared();
        let shared = shared_with(&sim, EngineConfig::new());
        let handle = LinkHandle::new();
        assert_eq!(
            attach(&shared, &handle, spec("  ", Direction::Input)),
            Err(LinkError::EmptyName)
        );
        assert!(!handle.is_attached());
        assert_eq!(handle.in_flight_count(), 0);
    }

    #[test]
    fn test_attach_queue_full_rolls_back() {
        let sim = SimService::new().shared();
        let shared = shared_with(&sim, EngineConfig::new().queue_depth(1));
        let a = LinkHandle::new();
        let b = LinkHandle::new();
        attach(&shared, &a, spec("dev:a", Direction::Output)).unwrap();
        assert_eq!(a.in_flight_count(), 1);
        assert_eq!(
            attach(&shared, &b, spec("dev:b", Direction::Output)),
            Err(LinkError::QueueFull)
        );
        assert!(!b.is_attached());
        assert_eq!(b.in_flight_count(), 0);
    }

    #[test]
    fn test_clear_unattached_is_error() {
        let handle = LinkHandle::new();
        assert_eq!(handle.clear(), Err(LinkError::NotAttached));
    }

    #[test]
    fn test_clear_abandons_queued_search() {
        let sim = SimService::new().shared();
        let config = EngineConfig::new().clear_wait(2, Duration::from_micros(10));
        let shared = shared_with(&sim, config);
        let handle = LinkHandle::new();
        attach(&shared, &handle, spec("dev:a", Direction::Output)).unwrap();

        assert_eq!(handle.clear(), Ok(ClearOutcome::Abandoned));
        assert!(!handle.is_attached());
        assert_eq!(ClearOutcome::Abandoned.code(), status::ABANDONED);

        // The search is skipped, the clear behind it releases the state.
        run_workers(&shared, &sim);
        assert_eq!(handle.in_flight_count(), 0);
        assert_eq!(sim.channel_count(), 0);
    }

    #[test]
    fn test_get_and_put_need_connection() {
        let sim = SimService::new().shared();
        let shared = shared_with(&sim, EngineConfig::new());
        let handle = LinkHandle::new();
        attach(&shared, &handle, spec("dev:never", Direction::Output)).unwrap();
        run_workers(&shared, &sim);

        let mut out = [7.0f64; 2];
        assert_eq!(handle.get(&mut out), Err(LinkError::NotConnected));
        assert_eq!(out, [7.0, 7.0]);
        assert_eq!(handle.put(&[1.0f64]), Err(LinkError::NotConnected));
        assert_eq!(handle.element_count(), Err(LinkError::NotConnected));
        assert_eq!(handle.connection_status(), ConnectionState::NotConnected);
    }

    #[test]
    fn test_put_wrong_type_and_direction() {
        let sim = SimService::new().shared();
        sim.add_point("dev:in", Values::Double(vec![1.0, 2.0]));
        let shared = shared_with(&sim, EngineConfig::new());
        let handle = LinkHandle::new();
        attach(&shared, &handle, spec("dev:in", Direction::Input)).unwrap();
        run_workers(&shared, &sim);

        assert_eq!(handle.link_state(), Some(LinkState::Connected));
        assert_eq!(handle.put(&[1.0f64]), Err(LinkError::WrongDirection("input")));
        let mut wrong = [0i32; 2];
        assert_eq!(handle.get(&mut wrong), Err(LinkError::TypeMismatch("double")));

        let mut out = [0.0f64; 4];
        let reading = handle.get(&mut out).unwrap();
        assert_eq!(reading.count, 2);
        assert_eq!(&out[..2], &[1.0, 2.0]);
    }

    #[test]
    fn test_notify_exclusive() {
        let sim = SimService::new().shared();
        sim.add_point("dev:out", Values::Double(vec![0.0]));
        let shared = shared_with(&sim, EngineConfig::new());
        let handle = LinkHandle::new();
        attach(&shared, &handle, spec("dev:out", Direction::Output)).unwrap();
        run_workers(&shared, &sim);

        handle.put_callback(&[1.0f64], callback(|_| {})).unwrap();
        assert!(handle.notify_in_progress());
        assert_eq!(
            handle.put_callback(&[2.0f64], callback(|_| {})),
            Err(LinkError::NotifyInProgress)
        );
        assert_eq!(handle.in_flight_count(), 1);

        run_workers(&shared, &sim);
        assert!(!handle.notify_in_progress());
        assert_eq!(sim.value("dev:out"), Some(Values::Double(vec![1.0])));
    }
}
