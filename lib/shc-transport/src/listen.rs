use crate::addr::resolve_ipv4;
use crate::cloexec::set_cloexec;
use shc_common::error::Result;
use shc_common::logging;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::TcpListener;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

/// Binds a TCP listener (§4.1). `host` may be a literal, a resolvable name, or `"*"`
/// for listen-any. Applies `SO_REUSEADDR` and `SO_LINGER{0,0}`, marks close-on-exec.
pub fn listen(host: &str, port: u16) -> Result<TcpListener> {
    let result = listen_inner(host, port);
    if let Err(ref err) = result {
        logging::warn!(logging::root(), "listen failed"; "remote_addr" => format!("{}:{}", host, port), "error" => format!("{:?}", err));
    }
    result
}

fn listen_inner(host: &str, port: u16) -> Result<TcpListener> {
    let addr = resolve_ipv4(host, port)?;

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(libc::SOMAXCONN)?;
    socket.set_linger(Some(Duration::from_secs(0)))?;
    set_cloexec(socket.as_raw_fd())?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_any_port_then_accepts_a_connection() {
        let listener = listen("127.0.0.1", 0).unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = std::thread::spawn(move || listener.accept().unwrap());
        let _client = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn listen_rejects_unresolvable_host() {
        let result = listen("this.host.does.not.resolve.invalid", 0);
        assert!(result.is_err());
    }
}
