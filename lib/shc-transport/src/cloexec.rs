use std::io;
use std::os::unix::io::RawFd;

/// Sets `FD_CLOEXEC` on `fd` (§4.1 "marked close-on-exec"). Explicit rather than
/// relying on a socket-creation flag, since the descriptor may have been obtained
/// from a non-blocking connect that started life without it.
pub fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
