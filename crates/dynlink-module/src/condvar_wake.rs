//! `CondvarWake`: portable `WakeSignal` implementation.
//!
//! A pending flag guarded by a mutex; `wait()` consumes it. Signals
//! raised while nobody waits stay pending until the next `wait()`.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use dynlink_core::sync::{lock, wait_while};
use dynlink_core::WakeSignal;

#[derive(Default)]
pub struct CondvarWake {
    pending: Mutex<bool>,
    cv: Condvar,
}

impl CondvarWake {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WakeSignal for CondvarWake {
    fn signal(&self) {
        *lock(&self.pending) = true;
        self.cv.notify_all();
    }

    fn wait(&self, timeout: Duration) -> bool {
        let guard = lock(&self.pending);
        let mut guard = wait_while(&self.cv, guard, timeout, |pending| !*pending);
        std::mem::take(&mut *guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_signal_before_wait_is_kept() {
        let w = CondvarWake::new();
        w.signal();
        w.signal();
        assert!(w.wait(Duration::from_millis(1)));
        // Coalesced: the second signal did not queue another wake.
        assert!(!w.wait(Duration::from_millis(1)));
    }

    #[test]
    fn test_wait_times_out() {
        let w = CondvarWake::new();
        let start = Instant::now();
        assert!(!w.wait(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_cross_thread_wake() {
        let w = Arc::new(CondvarWake::new());
        let w2 = Arc::clone(&w);
        let t = std::thread::spawn(move || w2.wait(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(10));
        w.signal();
        assert!(t.join().unwrap());
    }
}
