use serde_derive::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Default port used when a dial/listen address omits one (§6).
pub const DEFAULT_PORT: u16 = 4444;

/// Default process-wide TCP timeout, in milliseconds (§5).
const DEFAULT_TCP_TIMEOUT_MS: u64 = 5_000;

/// The process-wide TCP timeout. A single atomic variable with read-modify-return
/// semantics, shared by every connection's idle-timeout check (§5, §9 "Global state").
static TCP_TIMEOUT_MS: AtomicU64 = AtomicU64::new(DEFAULT_TCP_TIMEOUT_MS);

/// Current process-wide TCP timeout in milliseconds.
#[inline]
pub fn tcp_timeout_ms() -> u64 {
    TCP_TIMEOUT_MS.load(Ordering::Relaxed)
}

/// Atomically replaces the process-wide TCP timeout, returning the previous value.
#[inline]
pub fn set_tcp_timeout_ms(new_timeout_ms: u64) -> u64 {
    TCP_TIMEOUT_MS.swap(new_timeout_ms, Ordering::Relaxed)
}

/// Serializes host resolution against resolver implementations that are not
/// thread-safe under high concurrency (§4.1, §9 "Name resolution"). Correctness
/// must not depend on this lock being held; it exists only to avoid tripping
/// known-bad resolvers faster than they can be called.
pub static RESOLVER_LOCK: Mutex<()> = Mutex::new(());

/// Caller-facing configuration for dialing/listening and authenticating. Not part of
/// the wire protocol (§6 "Persisted state: None") — a convenience layer loadable from
/// a config file the same way the codebase's own services load theirs.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Shared secret used to derive the SipHash-2-4 key, if authentication is enabled.
    pub secret: Option<Vec<u8>>,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub default_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            secret: None,
            connect_timeout_ms: 1_000,
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            default_port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Parses a `Config` from a TOML or JSON file, inferring the format from the
    /// extension, mirroring the `serdeconv` pattern the codebase's own service
    /// configuration loaders use.
    pub fn load(path: &str) -> Result<Config, serdeconv::Error> {
        if path.ends_with(".json") {
            serdeconv::from_json_file(path)
        } else {
            serdeconv::from_toml_file(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_timeouts() {
        let config = Config::default();
        assert_eq!(config.default_port, DEFAULT_PORT);
        assert!(config.secret.is_none());
    }

    #[test]
    fn tcp_timeout_round_trips() {
        let previous = set_tcp_timeout_ms(7_500);
        assert_eq!(tcp_timeout_ms(), 7_500);
        set_tcp_timeout_ms(previous);
    }
}
