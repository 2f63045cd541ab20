//! Environment variable helpers used by `EngineConfig::from_env()`.
//!
//! # Usage
//!
//! ```ignore
//! use dynlink_core::env::{env_get, env_get_bool, env_get_ms};
//!
//! let depth: usize = env_get("DYNLINK_QUEUE_SIZE", 256);
//! let flush = env_get_bool("DYNLINK_OUT_FLUSH", true);
//! let wake = env_get_ms("DYNLINK_OUT_WAKE_MS", Duration::from_secs(1));
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Get environment variable parsed as type T, or return default.
///
/// Unset and unparsable values both fall back to `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean.
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true; any
/// other value is false. Unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Get environment variable as optional value.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Milliseconds variable as a `Duration`.
#[inline]
pub fn env_get_ms(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key).map(Duration::from_millis).unwrap_or(default)
}

/// Microseconds variable as a `Duration`.
#[inline]
pub fn env_get_us(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key).map(Duration::from_micros).unwrap_or(default)
}
