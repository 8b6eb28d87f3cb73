use shc_common::logging;
use shc_proto::{Parser, ParserSink};

/// Owns a parser and the reactor callbacks that drive it for one in-flight async
/// request (§4.5 "Async variant", §5 "Resource ownership"). The caller registers
/// this with its own reactor on the descriptor the request was written to; the
/// work item never touches the descriptor itself.
pub struct WorkItem<S: ParserSink> {
    parser: Parser,
    sink: S,
}

impl<S: ParserSink> WorkItem<S> {
    pub fn new(secret: Option<Vec<u8>>, sink: S) -> WorkItem<S> {
        WorkItem { parser: Parser::new(secret), sink }
    }

    /// Tags the underlying parser's logger with the peer's address (§2a, §7).
    pub fn with_remote_addr(mut self, addr: impl std::fmt::Display) -> WorkItem<S> {
        self.parser = self.parser.with_remote_addr(addr);
        self
    }

    /// Feeds newly-read bytes to the parser and drives it as far as they allow.
    /// Returns the number of bytes consumed -- currently always `bytes.len()`,
    /// matching the reactor callback ABI's "the parser took `len` bytes" contract
    /// (§6 "Callback ABI for reactor integration").
    pub fn on_input(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        self.parser.input(bytes)?;
        self.parser.update(&mut self.sink);
        Ok(bytes.len())
    }

    /// The process-wide TCP timeout elapsed with no activity on this connection
    /// (§5 "Cancellation & timeouts"). This does not deliver a terminal sink
    /// event on its own: the callback contract's three terminal notifications
    /// (`-1` done, `-2` failed, `-3` closed) are mutually exclusive, and a
    /// timeout's only consequence is the reactor closing the descriptor, which
    /// triggers `on_eof` (and thus `on_closed`) the same as any other close.
    pub fn on_timeout(&mut self) {
        logging::debug!(logging::root(), "work item idle timeout"; "cmd" => self.parser.command_byte());
    }

    /// The descriptor reached EOF or the reactor is tearing the connection down.
    pub fn on_eof(&mut self) {
        self.sink.on_closed();
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.parser.last_activity_ms()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
