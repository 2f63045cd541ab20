//! State shared by caller threads and both worker threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::error;

use dynlink_core::sync::lock;
use dynlink_core::{Direction, EngineConfig, LinkError, RemoteAccess, Result, WakeSignal};

use crate::command::Command;
use crate::dispatch;
use crate::pvt::LinkPvt;
use crate::queue::CommandQueue;

pub struct Shared {
    service: Arc<dyn RemoteAccess>,
    wake: Box<dyn WakeSignal>,
    config: EngineConfig,
    input: CommandQueue,
    output: CommandQueue,
    shutting_down: AtomicBool,
    /// Set once the workers are gone and the queues have been settled.
    stopped: AtomicBool,
    /// Workers drain their queues only while set.
    accepting: AtomicBool,
    /// Private state whose Clear could not be queued.
    deferred: Mutex<Vec<Arc<LinkPvt>>>,
}

impl Shared {
    pub fn new(
        service: Arc<dyn RemoteAccess>,
        wake: Box<dyn WakeSignal>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            input: CommandQueue::new("input", config.queue_depth),
            output: CommandQueue::new("output", config.queue_depth),
            service,
            wake,
            config,
            shutting_down: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
            deferred: Mutex::new(Vec::new()),
        })
    }

    pub fn service(&self) -> &dyn RemoteAccess {
        self.service.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn wake(&self) -> &dyn WakeSignal {
        self.wake.as_ref()
    }

    pub fn queue(&self, direction: Direction) -> &CommandQueue {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
        }
    }

    /// Non-blocking enqueue. A rejected command is dropped, releasing its
    /// pending ticket.
    pub fn enqueue(&self, direction: Direction, cmd: Command) -> Result<()> {
        if self.is_shutting_down() {
            return Err(LinkError::ShuttingDown);
        }
        let queue = self.queue(direction);
        if let Err(cmd) = queue.push(cmd) {
            error!(
                queue = queue.name(),
                "command queue full, dropping {:?}", cmd
            );
            return Err(LinkError::QueueFull);
        }
        if self.stopped.load(Ordering::SeqCst) {
            // Landed after the final drain; nobody else will pop it.
            self.settle(queue);
            return Ok(());
        }
        if direction == Direction::Output {
            self.wake.signal();
        }
        Ok(())
    }

    /// Hand a private state to the workers for teardown.
    pub fn enqueue_clear(&self, pvt: Arc<LinkPvt>) {
        let direction = pvt.direction();
        if self.is_shutting_down() {
            self.defer(pvt);
            return;
        }
        if let Err(cmd) = self.queue(direction).push(Command::Clear(pvt)) {
            error!("command queue full, deferring {:?}", cmd);
            if let Command::Clear(pvt) = cmd {
                self.defer(pvt);
            }
        }
        if direction == Direction::Output {
            self.wake.signal();
        }
    }

    /// Park `pvt` for the next reap, or tear it down here once the
    /// workers have stopped.
    fn defer(&self, pvt: Arc<LinkPvt>) {
        let mut deferred = lock(&self.deferred);
        if self.stopped.load(Ordering::SeqCst) {
            drop(deferred);
            dispatch::teardown(self, &pvt);
        } else {
            deferred.push(pvt);
        }
    }

    /// Tear down every deferred private state.
    pub fn reap_deferred(&self) {
        let parked = std::mem::take(&mut *lock(&self.deferred));
        for pvt in parked {
            dispatch::teardown(self, &pvt);
        }
    }

    pub fn deferred_count(&self) -> usize {
        lock(&self.deferred).len()
    }

    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.wake.signal();
    }

    #[inline]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::Release);
        if accepting {
            self.wake.signal();
        }
    }

    /// Settle everything left in the queues once the workers have exited.
    /// Clears are torn down; acknowledged requests get their callback with
    /// a fatal status. Anything enqueued afterwards is settled on the spot.
    pub fn drain_after_shutdown(&self) {
        {
            let _deferred = lock(&self.deferred);
            self.stopped.store(true, Ordering::SeqCst);
        }
        self.settle(&self.input);
        self.settle(&self.output);
        self.reap_deferred();
    }

    fn settle(&self, queue: &CommandQueue) {
        while let Some(cmd) = queue.pop() {
            dispatch::reject(self, cmd);
        }
    }

    /// True when the configured debug verbosity exceeds `level`.
    #[inline]
    pub fn chatty(&self, level: u32) -> bool {
        self.config.debug_level > level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{attach, LinkHandle};
    use crate::pvt::{callback, LinkSpec};
    use dynlink_core::{status, DataType, LinkOptions, LinkState, Values};
    use dynlink_module::{CondvarWake, SimService};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn connected_output(sim: &Arc<SimService>) -> (Arc<Shared>, LinkHandle) {
        sim.add_point("dev:late", Values::Double(vec![0.0]));
        let service: Arc<dyn RemoteAccess> = sim.clone();
        let shared = Shared::new(service, Box::new(CondvarWake::new()), EngineConfig::new());
        let handle = LinkHandle::new();
        let spec = LinkSpec {
            name: "dev:late".into(),
            direction: Direction::Output,
            data_type: DataType::Double,
            options: LinkOptions::SCALAR,
            search_cb: None,
            monitor_cb: None,
        };
        attach(&shared, &handle, spec).unwrap();
        while let Some(cmd) = shared.queue(Direction::Output).pop() {
            dispatch::dispatch(&shared, cmd);
        }
        sim.pump_events(Duration::ZERO).unwrap();
        assert_eq!(handle.link_state(), Some(LinkState::Connected));
        (shared, handle)
    }

    #[test]
    fn test_request_queued_after_final_drain_is_settled() {
        let sim = SimService::new().shared();
        let (shared, handle) = connected_output(&sim);
        shared.drain_after_shutdown();

        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let notify = callback(move |h| {
            assert_eq!(h.status(), status::FATAL_ERROR);
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(handle.put_callback(&[1.0f64], notify), Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!handle.notify_in_progress());
        assert_eq!(handle.in_flight_count(), 0);
        assert!(shared.queue(Direction::Output).is_empty());
        assert!(sim.writes().is_empty());
    }

    #[test]
    fn test_clear_after_stop_tears_down_inline() {
        let sim = SimService::new().shared();
        let (shared, handle) = connected_output(&sim);
        shared.begin_shutdown();
        shared.drain_after_shutdown();
        assert_eq!(sim.channel_count(), 1);

        handle.clear().unwrap();
        assert_eq!(shared.deferred_count(), 0);
        assert_eq!(sim.channel_count(), 0);
    }

    #[test]
    fn test_clear_during_shutdown_is_reaped_by_final_drain() {
        let sim = SimService::new().shared();
        let (shared, handle) = connected_output(&sim);
        shared.begin_shutdown();
        handle.clear().unwrap();
        assert_eq!(shared.deferred_count(), 1);

        shared.drain_after_shutdown();
        assert_eq!(shared.deferred_count(), 0);
        assert_eq!(sim.channel_count(), 0);
    }
}
