use std::time::{Instant, SystemTime};

/// Returns the current unix timestamp (seconds elapsed since 1970-01-01)
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Closed timelike curve, reality compromised")
        .as_secs()
}

/// Returns the current unix timestamp in milliseconds.
#[inline]
pub fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Closed timelike curve, reality compromised")
        .as_millis() as u64
}

/// Monotonic deadline `timeout_ms` milliseconds from now, used by the connect-timeout poll
/// and the parser's last-activity check. `Instant` rather than wall-clock time so a system
/// clock step can't shorten or lengthen an in-flight deadline.
#[inline]
pub fn deadline_from_now(timeout_ms: u64) -> Instant {
    Instant::now() + std::time::Duration::from_millis(timeout_ms)
}
