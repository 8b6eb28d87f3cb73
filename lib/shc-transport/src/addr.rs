use shc_common::config::RESOLVER_LOCK;
use shc_common::error::{Error, ErrorKind, Result, TransportErrorKind};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};

/// Validates an address string against `^([A-Za-z0-9_.\-]+|\*)(:[0-9]+)?$` (§6)
/// without pulling in a regex engine for a pattern this small.
fn validate(spec: &str) -> bool {
    let (host, port) = match spec.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => (host, Some(port)),
        _ => (spec, None),
    };

    if host.is_empty() {
        return false;
    }
    if host != "*" && !host.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-') {
        return false;
    }
    port.map_or(true, |p| p.parse::<u32>().map_or(false, |n| n <= u32::from(u16::MAX)))
}

/// Splits an address spec into `(host, port)`, applying the `:port` override precedence
/// described in §4.1 — a textual suffix beats the caller's fallback.
pub fn parse_port(spec: &str, fallback_port: u16) -> Result<(String, u16)> {
    if !validate(spec) {
        return Err(Error::Fatal(ErrorKind::Transport(TransportErrorKind::InvalidArgument)));
    }

    match spec.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| Error::Fatal(ErrorKind::Transport(TransportErrorKind::InvalidArgument)))?;
            Ok((host.to_string(), port))
        }
        None => Ok((spec.to_string(), fallback_port)),
    }
}

/// Resolves `host` to an IPv4 socket address, serialized under the process-wide
/// resolver mutex (§4.1, §5 "Shared resources"). `"*"` resolves to `0.0.0.0`.
pub fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddr> {
    if host == "*" {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Ok(SocketAddr::new(IpAddr::V4(addr), port));
    }

    let _guard = RESOLVER_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let resolved = (host, port)
        .to_socket_addrs()
        .map_err(|_| Error::Fatal(ErrorKind::Transport(TransportErrorKind::ResolutionFailed)))?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| Error::Fatal(ErrorKind::Transport(TransportErrorKind::ResolutionFailed)))?;
    Ok(resolved)
}
