#![forbid(unsafe_code)]

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Current Unix time in milliseconds.
#[inline]
pub fn unix_ms_now() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or(Duration::from_secs(0))
		.as_millis() as i64
}

/// Seconds elapsed since `started`, with sub-second precision.
#[inline]
pub fn uptime_secs(started: Instant) -> f64 {
	started.elapsed().as_secs_f64()
}
