use lazy_static::lazy_static;
use sloggers::{Config, LoggerConfig};

/// Re-exported so callers can hold a logger and log structured key-value pairs
/// (e.g. the remote address, per §2a/§7) without each crate adding its own
/// `slog` dependency.
pub use slog::{debug, error, info, o, warn, Logger};

lazy_static! {
    static ref ROOT: Logger = build_root_logger();
}

fn build_root_logger() -> Logger {
    let config: LoggerConfig = serdeconv::from_toml_str(
        r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#,
    )
    .expect("invalid built-in logger config");

    config.build_logger().expect("failed to build logger")
}

/// Forces construction of the process-wide root logger. Idempotent and safe to
/// call redundantly from multiple crates or test modules in the same process.
pub fn init() {
    lazy_static::initialize(&ROOT);
}

/// Returns the process-wide root logger, initializing it if necessary.
pub fn root() -> Logger {
    ROOT.clone()
}
