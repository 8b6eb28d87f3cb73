use std::io;

/// Result alias used throughout the protocol core.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type shared by the transport, codec and request-layer crates.
///
/// `Wait` is not a failure: it signals that an operation made no progress because
/// the descriptor or buffer wasn't ready, and the caller should retry once more
/// data (or capacity) is available. Everything else is terminal.
#[derive(Debug)]
pub enum Error {
    Wait,
    Fatal(ErrorKind),
}

#[derive(Debug)]
pub enum ErrorKind {
    Transport(TransportErrorKind),
    Protocol(ProtocolErrorKind),
    Auth(AuthErrorKind),
    Callback,
    Timeout,
}

#[derive(Debug)]
pub enum TransportErrorKind {
    InvalidArgument,
    ResolutionFailed,
    ConnectTimeout,
    Io(io::ErrorKind),
}

#[derive(Debug)]
pub enum ProtocolErrorKind {
    BadMagic,
    UnsupportedVersion(u8),
    UnknownCommand(u8),
    UnexpectedByte,
    RecordTooLarge,
    Truncated,
}

#[derive(Debug)]
pub enum AuthErrorKind {
    SignatureHeaderUnexpected,
    SignatureHeaderMissing,
    DigestMismatch,
}

impl From<io::Error> for Error {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => Error::Wait,
            kind => Error::Fatal(ErrorKind::Transport(TransportErrorKind::Io(kind))),
        }
    }
}

/// Convenience predicate mirroring the codebase's `ErrorUtils::has_failed` helper:
/// `Wait` does not count as failure, everything else does.
pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for Result<T> {
    fn has_failed(&self) -> bool {
        match self {
            Ok(_) => false,
            Err(Error::Wait) => false,
            _ => true,
        }
    }
}
