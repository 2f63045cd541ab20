#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use dynlink::{callback, Engine, EngineConfig, LinkCallback, SimService};

pub const DEADLINE: Duration = Duration::from_secs(5);

/// Poll `cond` every millisecond until it holds or `limit` passes.
pub fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

pub fn fast_config() -> EngineConfig {
    EngineConfig::new()
        .input_pend_event_time(Duration::from_millis(5))
        .output_wake_timeout(Duration::from_millis(5))
        .output_pend(true)
        .clear_wait(20, Duration::from_millis(1))
}

pub fn engine() -> (Arc<SimService>, Engine) {
    let sim = SimService::new().shared();
    let engine = Engine::new(sim.clone(), fast_config());
    (sim, engine)
}

/// A callback that counts its invocations and records the handle status
/// seen by the last one.
#[derive(Clone, Default)]
pub struct Tally {
    pub calls: Arc<AtomicUsize>,
    pub last_status: Arc<Mutex<Option<i64>>>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> LinkCallback {
        let tally = self.clone();
        callback(move |h| {
            *tally.last_status.lock().unwrap() = Some(h.status());
            tally.calls.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_status(&self) -> Option<i64> {
        *self.last_status.lock().unwrap()
    }
}
