//! Engine configuration
//!
//! Library defaults with runtime environment overrides, plus builder
//! setters for programmatic use.
//!
//! # Example
//!
//! ```rust,ignore
//! use dynlink_core::config::EngineConfig;
//!
//! let config = EngineConfig::from_env()
//!     .queue_depth(64)
//!     .output_wake_timeout(Duration::from_millis(200));
//! ```

use std::time::Duration;

use crate::env::{env_get, env_get_bool, env_get_ms, env_get_us};

/// Library defaults.
pub mod defaults {
    pub const QUEUE_DEPTH: usize = 256;
    pub const INPUT_PEND_EVENT: bool = true;
    pub const INPUT_PEND_EVENT_MS: u64 = 100;
    pub const INPUT_PEND_IO_MS: u64 = 100;
    pub const OUTPUT_FLUSH: bool = true;
    pub const OUTPUT_PEND: bool = false;
    pub const OUTPUT_WAKE_MS: u64 = 1000;
    pub const CONNECT_TIMEOUT_MS: u64 = 10_000;
    pub const CLEAR_RETRIES: u32 = 10;
    pub const CLEAR_RETRY_US: u64 = 1000;
    pub const DEBUG_LEVEL: u32 = 0;
}

/// Process-wide engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of each bounded command queue
    pub queue_depth: usize,
    /// Input worker pumps events after draining its queue
    pub input_pend_event: bool,
    /// Input worker event-pump timeout
    pub input_pend_event_time: Duration,
    /// Input worker I/O wait after issuing a read-with-acknowledgement
    pub input_pend_io_time: Duration,
    /// Output worker flushes outgoing traffic after draining
    pub output_flush: bool,
    /// Output worker runs a zero-timeout event pump after flushing
    pub output_pend: bool,
    /// Output worker wake-signal timeout
    pub output_wake_timeout: Duration,
    /// Timeout handed to `RemoteAccess::connect`
    pub connect_timeout: Duration,
    /// Clear: polls for in-flight work before abandoning
    pub clear_retries: u32,
    /// Clear: sleep between polls
    pub clear_retry_sleep: Duration,
    /// Diagnostic verbosity (0 = quiet, 5 = per-event, 10 = per-command, 15 = everything)
    pub debug_level: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `DYNLINK_QUEUE_SIZE` - Command queue capacity
    /// - `DYNLINK_INP_PEND_EVENT` - Input worker pumps events (0/1)
    /// - `DYNLINK_INP_PEND_EVENT_MS` - Input event-pump timeout
    /// - `DYNLINK_INP_PEND_IO_MS` - Input I/O wait after a read
    /// - `DYNLINK_OUT_FLUSH` - Output worker flushes (0/1)
    /// - `DYNLINK_OUT_PEND` - Output worker pumps events (0/1)
    /// - `DYNLINK_OUT_WAKE_MS` - Output wake timeout
    /// - `DYNLINK_CONNECT_TIMEOUT_MS` - Connect timeout
    /// - `DYNLINK_CLEAR_RETRIES` - Clear wait attempts
    /// - `DYNLINK_CLEAR_RETRY_US` - Clear wait sleep per attempt
    /// - `DYNLINK_DEBUG` - Debug verbosity
    pub fn from_env() -> Self {
        let d = Self::new();
        Self {
            queue_depth: env_get("DYNLINK_QUEUE_SIZE", d.queue_depth),
            input_pend_event: env_get_bool("DYNLINK_INP_PEND_EVENT", d.input_pend_event),
            input_pend_event_time: env_get_ms("DYNLINK_INP_PEND_EVENT_MS", d.input_pend_event_time),
            input_pend_io_time: env_get_ms("DYNLINK_INP_PEND_IO_MS", d.input_pend_io_time),
            output_flush: env_get_bool("DYNLINK_OUT_FLUSH", d.output_flush),
            output_pend: env_get_bool("DYNLINK_OUT_PEND", d.output_pend),
            output_wake_timeout: env_get_ms("DYNLINK_OUT_WAKE_MS", d.output_wake_timeout),
            connect_timeout: env_get_ms("DYNLINK_CONNECT_TIMEOUT_MS", d.connect_timeout),
            clear_retries: env_get("DYNLINK_CLEAR_RETRIES", d.clear_retries),
            clear_retry_sleep: env_get_us("DYNLINK_CLEAR_RETRY_US", d.clear_retry_sleep),
            debug_level: env_get("DYNLINK_DEBUG", d.debug_level),
        }
    }

    /// Library defaults, no env override.
    pub fn new() -> Self {
        Self {
            queue_depth: defaults::QUEUE_DEPTH,
            input_pend_event: defaults::INPUT_PEND_EVENT,
            input_pend_event_time: Duration::from_millis(defaults::INPUT_PEND_EVENT_MS),
            input_pend_io_time: Duration::from_millis(defaults::INPUT_PEND_IO_MS),
            output_flush: defaults::OUTPUT_FLUSH,
            output_pend: defaults::OUTPUT_PEND,
            output_wake_timeout: Duration::from_millis(defaults::OUTPUT_WAKE_MS),
            connect_timeout: Duration::from_millis(defaults::CONNECT_TIMEOUT_MS),
            clear_retries: defaults::CLEAR_RETRIES,
            clear_retry_sleep: Duration::from_micros(defaults::CLEAR_RETRY_US),
            debug_level: defaults::DEBUG_LEVEL,
        }
    }

    pub fn queue_depth(mut self, n: usize) -> Self {
        self.queue_depth = n.max(1);
        self
    }

    pub fn input_pend_event_time(mut self, d: Duration) -> Self {
        self.input_pend_event_time = d;
        self
    }

    pub fn output_wake_timeout(mut self, d: Duration) -> Self {
        self.output_wake_timeout = d;
        self
    }

    pub fn output_pend(mut self, enabled: bool) -> Self {
        self.output_pend = enabled;
        self
    }

    pub fn clear_wait(mut self, retries: u32, sleep: Duration) -> Self {
        self.clear_retries = retries;
        self.clear_retry_sleep = sleep;
        self
    }

    pub fn debug_level(mut self, level: u32) -> Self {
        self.debug_level = level;
        self
    }
}
