use crate::response::{self, IndexEntries};
use crate::workitem::WorkItem;
use shc_common::error::{Error, ErrorKind, ProtocolErrorKind, Result, TransportErrorKind};
use shc_common::logging;
use shc_proto::{build, Command, ParserSink, SigMode};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::ops::ControlFlow;

/// A connected request-layer client (§4.5). Blocking requests run on the caller's
/// thread and occupy the descriptor for the call's duration; `*_async` variants
/// write synchronously and hand back a [`WorkItem`] for the caller's own reactor.
pub struct Client {
    stream: TcpStream,
    secret: Option<Vec<u8>>,
    sig_mode: SigMode,
}

impl Client {
    /// Wraps an already-connected stream. `sig_mode` must be `SigMode::None` when
    /// `secret` is `None` (mirrors the builder's own invariant, §4.3).
    pub fn new(stream: TcpStream, secret: Option<Vec<u8>>, sig_mode: SigMode) -> Client {
        Client { stream, secret, sig_mode }
    }

    /// Dials `addr_spec` and wraps the resulting stream (§4.1, §4.5).
    pub fn connect(
        addr_spec: &str,
        fallback_port: u16,
        timeout_ms: u64,
        secret: Option<Vec<u8>>,
        sig_mode: SigMode,
    ) -> Result<Client> {
        let stream = shc_transport::dial(addr_spec, fallback_port, timeout_ms)?;
        Ok(Client::new(stream, secret, sig_mode))
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.single_record(Command::Get, &[key])
    }

    pub fn get_async(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.single_record(Command::GetAsync, &[key])
    }

    pub fn get_offset(&mut self, key: &[u8], offset: u32, len: u32) -> Result<Vec<u8>> {
        let records = [key.to_vec(), offset.to_be_bytes().to_vec(), len.to_be_bytes().to_vec()];
        self.single_record(Command::GetOffset, &records)
    }

    /// Returns `true` if the key already existed (status `EXISTS`), `false` if it
    /// was newly written (status `OK`).
    pub fn set(&mut self, key: &[u8], value: &[u8], expire: u32) -> Result<bool> {
        let record = self.single_record(Command::Set, &set_records(key, value, expire))?;
        response::set_outcome(&record)
    }

    pub fn add(&mut self, key: &[u8], value: &[u8], expire: u32) -> Result<bool> {
        let record = self.single_record(Command::Add, &set_records(key, value, expire))?;
        response::set_outcome(&record)
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let record = self.single_record(Command::Delete, &[key])?;
        response::expect_ok(&record)
    }

    pub fn evict(&mut self, key: &[u8]) -> Result<()> {
        let record = self.single_record(Command::Evict, &[key])?;
        response::expect_ok(&record)
    }

    pub fn exists(&mut self, key: &[u8]) -> Result<bool> {
        let record = self.single_record(Command::Exists, &[key])?;
        response::exists_outcome(&record)
    }

    pub fn touch(&mut self, key: &[u8]) -> Result<()> {
        let record = self.single_record(Command::Touch, &[key])?;
        response::expect_ok(&record)
    }

    pub fn check(&mut self) -> Result<()> {
        let empty: [&[u8]; 0] = [];
        let record = self.single_record(Command::Check, &empty)?;
        response::expect_ok(&record)
    }

    pub fn migration_begin(&mut self, plan: &[u8]) -> Result<()> {
        let record = self.single_record(Command::MigrationBegin, &[plan])?;
        response::expect_ok(&record)
    }

    pub fn migration_abort(&mut self) -> Result<()> {
        let empty: [&[u8]; 0] = [];
        let record = self.single_record(Command::MigrationAbort, &empty)?;
        response::expect_ok(&record)
    }

    /// Opaque text blob with a caller-appended NUL (§4.5).
    pub fn stats(&mut self) -> Result<Vec<u8>> {
        let empty: [&[u8]; 0] = [];
        let mut record = self.single_record(Command::Stats, &empty)?;
        record.push(0);
        Ok(record)
    }

    pub fn get_index(&mut self) -> Result<IndexEntries> {
        let empty: [&[u8]; 0] = [];
        let record = self.single_record_expecting(Command::GetIndex, &empty, Command::IndexResponse)?;
        Ok(response::parse_index(&record))
    }

    /// Builds and writes `cmd(records)` synchronously, then hands back a work item
    /// carrying an owned parser for the caller's reactor to drive (§4.5 "Async
    /// variant"). `sink` receives the protocol events as they arrive.
    pub fn request_async<S: ParserSink, R: AsRef<[u8]>>(
        &mut self,
        cmd: Command,
        records: &[R],
        sink: S,
    ) -> Result<WorkItem<S>> {
        self.write(cmd, records)?;
        let work_item = WorkItem::new(self.secret.clone(), sink);
        Ok(match self.stream.peer_addr() {
            Ok(peer) => work_item.with_remote_addr(peer),
            Err(_) => work_item,
        })
    }

    fn single_record<R: AsRef<[u8]>>(&mut self, cmd: Command, records: &[R]) -> Result<Vec<u8>> {
        self.single_record_expecting(cmd, records, Command::Response)
    }

    /// Writes `cmd(records)` and reads back a single-record reply, rejecting any
    /// reply whose command byte isn't `expected` (§4.5: a reply's command byte
    /// must be `RESPONSE`, or `INDEX_RESPONSE` for `GET_INDEX` -- a mismatch means
    /// the peer answered out of turn and its body must not be trusted).
    fn single_record_expecting<R: AsRef<[u8]>>(
        &mut self,
        cmd: Command,
        records: &[R],
        expected: Command,
    ) -> Result<Vec<u8>> {
        self.write(cmd, records)?;
        let (resp_cmd, records) = self.read_response()?;
        if resp_cmd != expected.to_byte() {
            return Err(Error::Fatal(ErrorKind::Protocol(ProtocolErrorKind::UnknownCommand(resp_cmd))));
        }
        records.into_iter().next().ok_or_else(|| Error::Fatal(ErrorKind::Protocol(ProtocolErrorKind::Truncated)))
    }

    fn write(&mut self, cmd: Command, records: &[impl AsRef<[u8]>]) -> Result<()> {
        let message = build(self.secret.as_deref(), self.sig_mode, cmd, records);
        write_message(&mut self.stream, &message)
    }

    fn read_response(&mut self) -> Result<(u8, Vec<Vec<u8>>)> {
        let mut parser = shc_proto::Parser::new(self.secret.clone());
        let mut collector = Collector::default();
        let mut buf = [0u8; 4096];

        while !collector.done && !collector.failed {
            let n = self.stream.read(&mut buf)?;
            if n == 0 {
                return Err(Error::Fatal(ErrorKind::Transport(TransportErrorKind::Io(io::ErrorKind::UnexpectedEof))));
            }
            parser.input(&buf[..n])?;
            parser.update(&mut collector);
        }

        if collector.failed {
            let remote = self.stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
            logging::warn!(logging::root(), "response failed parsing"; "remote_addr" => remote, "state" => format!("{:?}", parser.state()));
            return Err(match parser.state() {
                shc_proto::State::AuthErr => {
                    Error::Fatal(ErrorKind::Auth(shc_common::AuthErrorKind::DigestMismatch))
                }
                _ => Error::Fatal(ErrorKind::Protocol(ProtocolErrorKind::Truncated)),
            });
        }

        Ok((parser.command_byte(), collector.records))
    }
}

fn set_records(key: &[u8], value: &[u8], expire: u32) -> Vec<Vec<u8>> {
    if expire == 0 {
        vec![key.to_vec(), value.to_vec()]
    } else {
        vec![key.to_vec(), value.to_vec(), expire.to_be_bytes().to_vec()]
    }
}

/// Writes `bytes` to `stream`, switching it to blocking mode first and retrying on
/// `EINTR` (§4.3 "Write path"). Any other error, or a zero-byte write, is fatal.
fn write_message(stream: &mut TcpStream, bytes: &[u8]) -> Result<()> {
    stream.set_nonblocking(false)?;

    let mut written = 0;
    while written < bytes.len() {
        match stream.write(&bytes[written..]) {
            Ok(0) => {
                return Err(Error::Fatal(ErrorKind::Transport(TransportErrorKind::Io(io::ErrorKind::WriteZero))))
            }
            Ok(n) => written += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[derive(Default)]
struct Collector {
    records: Vec<Vec<u8>>,
    done: bool,
    failed: bool,
}

impl ParserSink for Collector {
    fn on_chunk(&mut self, idx: u32, chunk: &[u8]) -> ControlFlow<()> {
        let idx = idx as usize;
        if self.records.len() <= idx {
            self.records.resize(idx + 1, Vec::new());
        }
        self.records[idx].extend_from_slice(chunk);
        ControlFlow::Continue(())
    }

    fn on_record_end(&mut self, idx: u32) -> ControlFlow<()> {
        let idx = idx as usize;
        if self.records.len() <= idx {
            self.records.resize(idx + 1, Vec::new());
        }
        ControlFlow::Continue(())
    }

    fn on_done(&mut self) {
        self.done = true;
    }

    fn on_failed(&mut self) {
        self.failed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Spins up a loopback listener that echoes back one canned response message
    /// per accepted connection, then returns the client wired to it.
    fn server_replying_with(response: Vec<u8>) -> Client {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut discard = [0u8; 1024];
            let _ = stream.read(&mut discard); // drain the request
            stream.write_all(&response).unwrap();
        });

        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        Client::new(stream, None, SigMode::None)
    }

    #[test]
    fn get_returns_value_record() {
        let response = build(None, SigMode::None, Command::Response, &[b"hello" as &[u8]]);
        let mut client = server_replying_with(response);
        let value = client.get(b"key").unwrap();
        assert_eq!(value, b"hello");
    }

    #[test]
    fn set_reports_created_vs_overwritten() {
        let response = build(None, SigMode::None, Command::Response, &[&[0x00u8] as &[u8]]);
        let mut client = server_replying_with(response);
        let existed = client.set(b"key", b"value", 0).unwrap();
        assert_eq!(existed, false);

        let response = build(None, SigMode::None, Command::Response, &[&[0x02u8] as &[u8]]);
        let mut client = server_replying_with(response);
        let existed = client.set(b"key", b"value", 0).unwrap();
        assert_eq!(existed, true);
    }

    #[test]
    fn exists_reads_yes_no() {
        let response = build(None, SigMode::None, Command::Response, &[&[0x01u8] as &[u8]]);
        let mut client = server_replying_with(response);
        assert_eq!(client.exists(b"key").unwrap(), true);
    }

    #[test]
    fn delete_fails_on_err_status() {
        let response = build(None, SigMode::None, Command::Response, &[&[0xFFu8] as &[u8]]);
        let mut client = server_replying_with(response);
        assert!(client.delete(b"key").is_err());
    }

    #[test]
    fn get_index_reports_truncation_but_keeps_entries() {
        let mut body = Vec::new();
        body.extend_from_slice(&3u32.to_be_bytes());
        body.extend_from_slice(b"key");
        body.extend_from_slice(&7u32.to_be_bytes());
        body.extend_from_slice(&2u32.to_be_bytes()); // declares another key, then stream ends

        let response = build(None, SigMode::None, Command::IndexResponse, &[body]);
        let mut client = server_replying_with(response);
        let result = client.get_index().unwrap();
        assert!(result.truncated);
        assert_eq!(result.entries, vec![(b"key".to_vec(), 7)]);
    }

    #[test]
    fn reply_with_wrong_command_is_rejected() {
        // A peer that answers with the wrong command byte (here, echoing back
        // GET instead of replying with RESPONSE) must not be trusted.
        let response = build(None, SigMode::None, Command::Get, &[b"value" as &[u8]]);
        let mut client = server_replying_with(response);
        assert!(client.get(b"key").is_err());
    }

    #[test]
    fn signed_round_trip_with_matching_secret() {
        let response = build(Some(b"s3cret" as &[u8]), SigMode::Whole, Command::Response, &[b"hi" as &[u8]]);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut discard = [0u8; 1024];
            let _ = stream.read(&mut discard);
            stream.write_all(&response).unwrap();
        });

        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let mut client = Client::new(stream, Some(b"s3cret".to_vec()), SigMode::Whole);
        assert_eq!(client.get(b"key").unwrap(), b"hi");
    }
}
