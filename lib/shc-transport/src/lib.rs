//! Socket plumbing for the cache protocol: TCP dial with connect-timeout, TCP
//! listen, Unix-domain listener, and FIFO support (§4.1). Everything here is a
//! thin, explicit layer over `socket2`/`libc` -- no reactor, no buffering; that
//! lives in `shc-proto` and the request layer built on top of it.

mod cloexec;

pub mod addr;
pub mod dial;
pub mod listen;
pub mod unix;

pub use addr::{parse_port, resolve_ipv4};
pub use dial::dial;
pub use listen::listen;
pub use unix::{open_fifo, unix_listener};
