use crate::addr::{parse_port, resolve_ipv4};
use crate::cloexec::set_cloexec;
use shc_common::error::{Error, ErrorKind, Result, TransportErrorKind};
use shc_common::logging;
use shc_common::time::deadline_from_now;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::TcpStream;
use std::os::unix::io::AsRawFd;
use std::time::Instant;

/// Dials a TCP peer with a millisecond connect-timeout (§4.1). `timeout_ms == 0`
/// performs a plain blocking connect with no deadline.
pub fn dial(addr_spec: &str, fallback_port: u16, timeout_ms: u64) -> Result<TcpStream> {
    let (host, port) = match parse_port(addr_spec, fallback_port) {
        Ok(parsed) => parsed,
        Err(err) => {
            logging::warn!(logging::root(), "dial rejected address"; "addr" => addr_spec);
            return Err(err);
        }
    };
    let target = match resolve_ipv4(&host, port) {
        Ok(target) => target,
        Err(err) => {
            logging::warn!(logging::root(), "dial failed to resolve host"; "remote_addr" => format!("{}:{}", host, port));
            return Err(err);
        }
    };

    let result = dial_target(target, timeout_ms);
    if let Err(ref err) = result {
        logging::warn!(logging::root(), "dial failed"; "remote_addr" => target.to_string(), "error" => format!("{:?}", err));
    }
    result
}

fn dial_target(target: std::net::SocketAddr, timeout_ms: u64) -> Result<TcpStream> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;

    if timeout_ms == 0 {
        socket.connect(&target.into())?;
    } else {
        socket.set_nonblocking(true)?;
        match socket.connect(&target.into()) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                poll_for_connect(&socket, timeout_ms)?;
            }
            Err(err) => return Err(err.into()),
        }
        socket.set_nonblocking(false)?;
    }

    set_cloexec(socket.as_raw_fd())?;
    Ok(socket.into())
}

/// Polls the connecting socket for writability with an absolute deadline, checking
/// `SO_ERROR` on every wakeup (§4.1). Uses `libc::poll` rather than `select` so the
/// descriptor-set size has no bearing on correctness for high descriptor numbers
/// (see DESIGN.md, Open Question: connect-timeout polling primitive).
fn poll_for_connect(socket: &Socket, timeout_ms: u64) -> Result<()> {
    let deadline = deadline_from_now(timeout_ms);

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Fatal(ErrorKind::Transport(TransportErrorKind::ConnectTimeout)));
        }

        let mut pollfd = libc::pollfd {
            fd: socket.as_raw_fd(),
            events: libc::POLLOUT,
            revents: 0,
        };
        let wait_ms = remaining.as_millis().min(i32::MAX as u128) as i32;
        let rc = unsafe { libc::poll(&mut pollfd, 1, wait_ms) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        if rc == 0 {
            continue; // timed out this round; loop re-checks the absolute deadline
        }

        match socket.take_error()? {
            None => return Ok(()),
            Some(err) if err.raw_os_error() == Some(libc::EINPROGRESS) => continue,
            Some(err) => return Err(err.into()),
        }
    }
}
