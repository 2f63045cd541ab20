//! `EventFdWake`: default `WakeSignal` implementation on Linux.
//!
//! Writes to an eventfd to wake the output worker; the worker waits with
//! `poll(2)` and drains the counter. Multiple `signal()` calls before the
//! worker wakes result in a single wakeup (eventfd counter semantics).

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use dynlink_core::WakeSignal;

pub struct EventFdWake {
    fd: RawFd,
}

impl EventFdWake {
    /// Create a new non-blocking eventfd and wrap it. Closed on drop.
    pub fn create() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    /// Reset the counter to zero.
    fn drain(&self) {
        let mut val: u64 = 0;
        // EAGAIN just means someone else drained it first.
        unsafe {
            libc::read(
                self.fd,
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            );
        }
    }
}

impl WakeSignal for EventFdWake {
    fn signal(&self) {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd,
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            // EAGAIN: counter saturated, a wake is already pending.
            if err.raw_os_error() != Some(libc::EAGAIN) {
                tracing::error!("EventFdWake: eventfd write failed: {}", err);
            }
        }
    }

    fn wait(&self, timeout: Duration) -> bool {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        // Round up so sub-millisecond timeouts still sleep.
        let ms = timeout.as_micros().div_ceil(1000).min(i32::MAX as u128) as libc::c_int;
        let ret = unsafe { libc::poll(&mut pfd, 1, ms) };
        if ret > 0 && (pfd.revents & libc::POLLIN) != 0 {
            self.drain();
            true
        } else {
            false
        }
    }
}

impl Drop for EventFdWake {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
            self.fd = -1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_signal_then_wait() {
        let w = EventFdWake::create().unwrap();
        assert!(w.fd >= 0);
        w.signal();
        w.signal();
        assert!(w.wait(Duration::from_millis(10)));
        assert!(!w.wait(Duration::from_millis(1)));
    }

    #[test]
    fn test_cross_thread_wake() {
        let w = Arc::new(EventFdWake::create().unwrap());
        let w2 = Arc::clone(&w);
        let t = std::thread::spawn(move || w2.wait(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(10));
        w.signal();
        assert!(t.join().unwrap());
    }
}
