use shc_common::error::Result;
use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::FromRawFd;
use std::os::unix::net::UnixListener;
use std::path::Path;

/// Opens a Unix-domain listener at `path`, unlinking any pre-existing path first
/// (§4.1 "Unix listener / FIFO").
pub fn unix_listener(path: &str) -> Result<UnixListener> {
    let _ = std::fs::remove_file(path);
    UnixListener::bind(path).map_err(Into::into)
}

/// Opens a FIFO at `path` for non-blocking read/write, creating it with mode `0600`
/// if it doesn't already exist. Rejects an existing path that isn't a FIFO.
pub fn open_fifo(path: &str) -> Result<File> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => {}
        Ok(_) => {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "path exists and is not a FIFO").into());
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => mkfifo(path, 0o600)?,
        Err(err) => return Err(err.into()),
    }

    let cpath = to_cstring(path)?;
    let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR | libc::O_NONBLOCK) };
    if fd < 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(unsafe { File::from_raw_fd(fd) })
}

fn mkfifo(path: &str, mode: libc::mode_t) -> io::Result<()> {
    let cpath = to_cstring(path)?;
    let rc = unsafe { libc::mkfifo(cpath.as_ptr(), mode) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn to_cstring(path: &str) -> io::Result<CString> {
    CString::new(Path::new(path).as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains an interior NUL"))
}
