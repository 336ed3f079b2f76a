//! Connection State Machine, §4.E. Grounded on `original_source/src/connection.c`'s
//! `state_enter`/`state_execute`/`state_exit` dispatch tables, expressed per
//! spec.md §9's Design Notes as a sum type over states with per-state behavior
//! rather than parallel function-pointer arrays — and on
//! `neutronium::net::channel::Channel` for the nonblocking send/receive loops.
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use slog::{debug, trace, warn, Logger};

use crate::error::{ErrorKind, IoOutcome};
use crate::framer::{Chunk, Framer};
use crate::message::Message;
use crate::resolver::{Resolver, ResolveStatus, ThreadResolver};
use crate::transport::{RustlsTransport, Transport};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum State {
    Disconnected,
    Resolving,
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

/// The two transports a `Connection` can hold. An enum rather than a boxed
/// `dyn Transport` because a connection only ever upgrades Plain -> Tls once,
/// immediately after connect, never the reverse — there is no need to support
/// arbitrary third-party transports plugged into a live connection.
enum TransportSlot {
    Plain(mio::net::TcpStream),
    Tls(RustlsTransport),
}

impl TransportSlot {
    fn socket(&self) -> &mio::net::TcpStream {
        match self {
            TransportSlot::Plain(s) => s,
            TransportSlot::Tls(t) => t.socket(),
        }
    }

    fn is_handshaking(&self) -> bool {
        match self {
            TransportSlot::Plain(s) => Transport::is_handshaking(s),
            TransportSlot::Tls(t) => t.is_handshaking(),
        }
    }

    fn drive_handshake(&mut self) -> io::Result<bool> {
        match self {
            TransportSlot::Plain(s) => Transport::drive_handshake(s),
            TransportSlot::Tls(t) => t.drive_handshake(),
        }
    }
}

impl Read for TransportSlot {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            TransportSlot::Plain(s) => s.read(buf),
            TransportSlot::Tls(t) => t.read(buf),
        }
    }
}

impl Write for TransportSlot {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TransportSlot::Plain(s) => s.write(buf),
            TransportSlot::Tls(t) => t.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TransportSlot::Plain(s) => s.flush(),
            TransportSlot::Tls(t) => t.flush(),
        }
    }
}

/// Per-connection record, §3. Every field here is reachable only through
/// `Connection`'s methods; the pool never reaches into it directly, matching
/// `original_source/src/connection.c`'s mutex-guarded access pattern (expressed
/// by the pool holding a `Mutex<Connection>` per slot instead of a raw struct).
pub struct Connection {
    state: State,
    transport: Option<TransportSlot>,
    resolver: Option<Box<dyn Resolver>>,
    pending_host: String,
    pending_port: u16,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    send_queue: VecDeque<Chunk>,
    framer: Framer,
    last_error: ErrorKind,
    disconnect_requested: bool,
    socket_is_readable: bool,
    socket_is_writable: bool,
    malformed_lines: u64,
    logger: Logger,
}

impl Connection {
    pub fn new(logger: Logger) -> Self {
        Connection {
            state: State::Disconnected,
            transport: None,
            resolver: None,
            pending_host: String::new(),
            pending_port: 0,
            tls_config: None,
            send_queue: VecDeque::new(),
            framer: Framer::new(),
            last_error: ErrorKind::None,
            disconnect_requested: false,
            socket_is_readable: false,
            socket_is_writable: false,
            malformed_lines: 0,
            logger,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn last_error(&self) -> ErrorKind {
        self.last_error
    }

    pub fn wants_read(&self) -> bool {
        matches!(self.state, State::Connecting | State::Connected | State::Disconnecting)
    }

    pub fn wants_write(&self) -> bool {
        match self.state {
            State::Connecting => true,
            State::Connected => !self.send_queue.is_empty(),
            _ => false,
        }
    }

    pub fn wants_timeout(&self) -> bool {
        matches!(self.state, State::Resolving)
    }

    /// Returns the raw socket to register with the driver's `mio::Poll`, if the
    /// connection currently owns one.
    pub fn registration_socket(&self) -> Option<&mio::net::TcpStream> {
        self.transport.as_ref().map(TransportSlot::socket)
    }

    /// `connect(host, port, secure)`, §4.E: DISCONNECTED -> RESOLVING.
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        secure: Option<Arc<rustls::ClientConfig>>,
    ) -> Result<(), ErrorKind> {
        if self.state != State::Disconnected {
            return Err(ErrorKind::State);
        }
        self.pending_host = host.to_owned();
        self.pending_port = port;
        self.tls_config = secure;
        self.resolver = Some(Box::new(ThreadResolver::spawn(host.to_owned(), port)));
        self.state = State::Resolving;
        debug!(self.logger, "connect requested"; "host" => host, "port" => port);
        Ok(())
    }

    /// `disconnect()`, §4.E: requests CONNECTED -> DISCONNECTING on the next tick.
    pub fn disconnect(&mut self) {
        if matches!(self.state, State::Connected | State::Connecting) {
            self.disconnect_requested = true;
        }
    }

    /// `reset_error()`, §4.E: ERROR -> DISCONNECTED. A no-op outside ERROR.
    pub fn reset_error(&mut self) {
        if self.state == State::Error {
            self.state = State::Disconnected;
            self.last_error = ErrorKind::None;
        }
    }

    /// Formats and enqueues `message` for sending. Only legal while CONNECTED.
    /// The 510-byte cap (spec.md §4.E) applies to the body alone — prefix,
    /// command, params and their separators — not the separately-capped tag
    /// prelude, matching `original_source/src/connection.c`'s
    /// `conn_queue_message`, which formats prefix+command+params into its
    /// `buf[516]` scratch buffer and never includes tags in that measurement.
    pub fn queue_message(&mut self, message: &Message) -> Result<(), ErrorKind> {
        if self.state != State::Connected {
            return Err(ErrorKind::State);
        }
        if message.serialize_body().len() > crate::message::MAX_BODY_BYTES {
            return Err(ErrorKind::MsgLen);
        }
        self.send_queue.push_back(Chunk {
            bytes: message.serialize(),
            ends_with_eol: true,
        });
        Ok(())
    }

    /// Pops and parses the next complete received line. Malformed lines are
    /// skipped (logged, counted) rather than surfaced or treated as fatal,
    /// per spec.md §4.E's `recv_message` contract.
    pub fn recv_message(&mut self) -> Option<Message> {
        loop {
            let line = self.framer.pop_line()?;
            match Message::parse(&line) {
                Ok(message) => return Some(message),
                Err(_) => {
                    self.malformed_lines += 1;
                    warn!(self.logger, "discarding malformed line"; "count" => self.malformed_lines);
                }
            }
        }
    }

    pub fn malformed_line_count(&self) -> u64 {
        self.malformed_lines
    }

    /// Number of complete lines currently sitting in the receive queue,
    /// poppable by `recv_message` without blocking. Used by the pool to report
    /// newly arrived message counts across a tick.
    pub fn pending_line_count(&self) -> usize {
        self.framer.complete_line_count()
    }

    /// `tick(readable, writable)`, §4.E: records readiness, executes the current
    /// state's behavior, and transitions if the computed next state differs.
    pub fn tick(&mut self, readable: bool, writable: bool) {
        self.socket_is_readable = readable;
        self.socket_is_writable = writable;

        let next = match self.state {
            State::Disconnected => State::Disconnected,
            State::Resolving => self.execute_resolving(),
            State::Connecting => self.execute_connecting(),
            State::Connected => self.execute_connected(),
            State::Disconnecting => self.execute_disconnecting(),
            State::Error => State::Error,
        };

        if next != self.state {
            trace!(self.logger, "state transition"; "from" => ?self.state, "to" => ?next);
            self.state = next;
        }
    }

    fn execute_resolving(&mut self) -> State {
        let resolver = match &mut self.resolver {
            Some(r) => r,
            None => return State::Error,
        };
        match resolver.poll() {
            ResolveStatus::Pending => State::Resolving,
            ResolveStatus::Failed => {
                self.last_error = ErrorKind::Resolv;
                State::Error
            }
            ResolveStatus::Ready(addrs) => self.begin_connect(&addrs),
        }
    }

    fn begin_connect(&mut self, addrs: &[SocketAddr]) -> State {
        self.resolver = None;
        let addr = match addrs.first() {
            Some(a) => *a,
            None => {
                self.last_error = ErrorKind::Resolv;
                return State::Error;
            }
        };
        match mio::net::TcpStream::connect(&addr) {
            Ok(socket) => {
                self.transport = Some(TransportSlot::Plain(socket));
                State::Connecting
            }
            Err(e) => {
                self.last_error = ErrorKind::Io(e.kind());
                State::Error
            }
        }
    }

    fn execute_connecting(&mut self) -> State {
        if !self.socket_is_writable {
            return State::Connecting;
        }

        let connect_error = match &self.transport {
            Some(t) => t.socket().take_error(),
            None => return State::Error,
        };
        match connect_error {
            Ok(Some(e)) | Err(e) => {
                self.last_error = ErrorKind::Io(e.kind());
                return State::Error;
            }
            Ok(None) => {}
        }

        if let Err(kind) = self.upgrade_to_tls_if_needed() {
            self.last_error = kind;
            return State::Error;
        }

        match &mut self.transport {
            Some(t) => match t.drive_handshake() {
                Ok(true) => State::Connected,
                Ok(false) => State::Connecting,
                Err(e) => match IoOutcome::from(e) {
                    IoOutcome::WouldBlock => State::Connecting,
                    IoOutcome::Fatal(_) => {
                        self.last_error = ErrorKind::Connect;
                        State::Error
                    }
                },
            },
            None => State::Error,
        }
    }

    /// Upgrades a freshly connected plain socket to TLS, once, the first tick
    /// after connect succeeds while a TLS config was supplied to `connect`.
    fn upgrade_to_tls_if_needed(&mut self) -> Result<(), ErrorKind> {
        let needs_upgrade = matches!(self.transport, Some(TransportSlot::Plain(_))) && self.tls_config.is_some();
        if !needs_upgrade {
            return Ok(());
        }
        let config = self.tls_config.clone().expect("checked above");
        let socket = match self.transport.take() {
            Some(TransportSlot::Plain(s)) => s,
            other => {
                self.transport = other;
                return Ok(());
            }
        };
        let upgraded = RustlsTransport::new(config, &self.pending_host, socket)?;
        self.transport = Some(TransportSlot::Tls(upgraded));
        Ok(())
    }

    fn execute_connected(&mut self) -> State {
        if self.disconnect_requested {
            self.disconnect_requested = false;
            return State::Disconnecting;
        }

        let transport = match &mut self.transport {
            Some(t) => t,
            None => return State::Error,
        };

        if self.socket_is_readable {
            match run_receive(&mut self.framer, transport) {
                Ok(ReceiveOutcome::Progress) => {}
                Ok(ReceiveOutcome::PeerClosed) => return State::Disconnecting,
                Err(kind) => {
                    self.last_error = kind;
                    return State::Error;
                }
            }
        }

        if self.socket_is_writable && !self.send_queue.is_empty() {
            match run_send(&mut self.send_queue, transport) {
                Ok(SendOutcome::Progress) | Ok(SendOutcome::Empty) => {}
                Ok(SendOutcome::PeerClosed) => return State::Disconnecting,
                Err(kind) => {
                    self.last_error = kind;
                    return State::Error;
                }
            }
        }

        State::Connected
    }

    fn execute_disconnecting(&mut self) -> State {
        self.send_queue.clear();
        self.framer = Framer::new();
        self.transport = None;
        self.disconnect_requested = false;
        State::Disconnected
    }
}

enum ReceiveOutcome {
    Progress,
    PeerClosed,
}

enum SendOutcome {
    Progress,
    Empty,
    PeerClosed,
}

/// Receive algorithm, §4.E: reads into a 516-byte buffer until would-block or
/// EOF, feeding every read to the framer.
fn run_receive(framer: &mut Framer, reader: &mut dyn Read) -> Result<ReceiveOutcome, ErrorKind> {
    let mut buf = [0u8; 516];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                framer.end_of_tick();
                return Ok(ReceiveOutcome::PeerClosed);
            }
            Ok(n) => framer.feed(&buf[..n]),
            Err(e) => match IoOutcome::from(e) {
                IoOutcome::WouldBlock => {
                    framer.end_of_tick();
                    return Ok(ReceiveOutcome::Progress);
                }
                IoOutcome::Fatal(kind) => return Err(kind),
            },
        }
    }
}

/// Send algorithm, §4.E: repeatedly writes the queue head; a partial write
/// replaces the head with the unwritten suffix and the loop retries
/// immediately; would-block/interrupt ends the tick's attempt normally.
fn run_send(queue: &mut VecDeque<Chunk>, writer: &mut dyn Write) -> Result<SendOutcome, ErrorKind> {
    loop {
        let chunk = match queue.front() {
            Some(c) => c,
            None => return Ok(SendOutcome::Empty),
        };
        match writer.write(&chunk.bytes) {
            Ok(0) => return Ok(SendOutcome::PeerClosed),
            Ok(n) if n >= chunk.bytes.len() => {
                queue.pop_front();
            }
            Ok(n) => {
                let ends_with_eol = chunk.ends_with_eol;
                let remainder = chunk.bytes[n..].to_vec();
                queue.pop_front();
                queue.push_front(Chunk {
                    bytes: remainder,
                    ends_with_eol,
                });
            }
            Err(e) => match IoOutcome::from(e) {
                IoOutcome::WouldBlock => return Ok(SendOutcome::Progress),
                IoOutcome::Fatal(kind) => return Err(kind),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageBuilder;
    use sloggers::{null::NullLoggerBuilder, Build};
    use std::io;

    fn test_logger() -> Logger {
        NullLoggerBuilder.build().unwrap()
    }

    struct MockStream {
        read_chunks: VecDeque<io::Result<Vec<u8>>>,
        written: Vec<u8>,
        write_limit: Option<usize>,
    }

    impl MockStream {
        fn new() -> Self {
            MockStream {
                read_chunks: VecDeque::new(),
                written: Vec::new(),
                write_limit: None,
            }
        }

        fn push_read(&mut self, bytes: &[u8]) {
            self.read_chunks.push_back(Ok(bytes.to_vec()));
        }

        fn push_would_block(&mut self) {
            self.read_chunks
                .push_back(Err(io::Error::new(io::ErrorKind::WouldBlock, "wb")));
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.read_chunks.pop_front() {
                Some(Ok(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(io::ErrorKind::WouldBlock, "empty")),
            }
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = self.write_limit.unwrap_or(buf.len()).min(buf.len());
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn wants_read_write_timeout_by_state() {
        let conn = Connection::new(test_logger());
        assert!(!conn.wants_read());
        assert!(!conn.wants_write());
        assert!(!conn.wants_timeout());
    }

    #[test]
    fn queue_message_rejected_outside_connected() {
        let mut conn = Connection::new(test_logger());
        let msg = MessageBuilder::new("PING").build().unwrap();
        assert_eq!(conn.queue_message(&msg), Err(ErrorKind::State));
    }

    #[test]
    fn queue_message_measures_body_not_tag_prelude() {
        // A large tag prelude pushes the full wire form past 512 bytes while the
        // body (prefix+command+params) stays well under the 510-byte cap; only
        // the body is supposed to be measured here (spec.md §4.E).
        let mut conn = Connection::new(test_logger());
        conn.state = State::Connected;
        let long_value = vec![b'a'; 4000];
        let msg = MessageBuilder::new("PRIVMSG")
            .with_tag("x", Some(&long_value))
            .add_param("#chan")
            .add_param("hi")
            .build()
            .unwrap();
        assert!(msg.serialize().len() > crate::message::MAX_BODY_BYTES + 2);
        assert!(conn.queue_message(&msg).is_ok());
    }

    #[test]
    fn reset_error_returns_to_disconnected() {
        let mut conn = Connection::new(test_logger());
        conn.state = State::Error;
        conn.last_error = ErrorKind::Connect;
        conn.reset_error();
        assert_eq!(conn.state(), State::Disconnected);
        assert_eq!(conn.last_error(), ErrorKind::None);
    }

    #[test]
    fn reset_error_is_noop_outside_error() {
        let mut conn = Connection::new(test_logger());
        conn.reset_error();
        assert_eq!(conn.state(), State::Disconnected);
    }

    #[test]
    fn run_receive_feeds_framer_and_stops_on_would_block() {
        let mut stream = MockStream::new();
        stream.push_read(b"PING\r\n");
        stream.push_would_block();
        let mut framer = Framer::new();
        let outcome = run_receive(&mut framer, &mut stream).unwrap();
        assert!(matches!(outcome, ReceiveOutcome::Progress));
        assert_eq!(framer.pop_line(), Some(b"PING\r\n".to_vec()));
    }

    #[test]
    fn run_receive_reports_peer_closed_on_zero_read() {
        let mut stream = MockStream::new();
        stream.read_chunks.push_back(Ok(Vec::new()));
        let mut framer = Framer::new();
        let outcome = run_receive(&mut framer, &mut stream).unwrap();
        assert!(matches!(outcome, ReceiveOutcome::PeerClosed));
    }

    #[test]
    fn run_send_drains_queue_in_order() {
        let mut queue = VecDeque::new();
        queue.push_back(Chunk { bytes: b"PING\r\n".to_vec(), ends_with_eol: true });
        queue.push_back(Chunk { bytes: b"PONG\r\n".to_vec(), ends_with_eol: true });
        let mut stream = MockStream::new();
        let outcome = run_send(&mut queue, &mut stream).unwrap();
        assert!(matches!(outcome, SendOutcome::Empty));
        assert_eq!(stream.written, b"PING\r\nPONG\r\n".to_vec());
    }

    #[test]
    fn run_send_requeues_unwritten_suffix_on_partial_write() {
        let mut queue = VecDeque::new();
        queue.push_back(Chunk { bytes: b"PING\r\n".to_vec(), ends_with_eol: true });
        let mut stream = MockStream::new();
        stream.write_limit = Some(2);
        let outcome = run_send(&mut queue, &mut stream).unwrap();
        assert!(matches!(outcome, SendOutcome::Empty));
        assert_eq!(stream.written, b"PING\r\n".to_vec());
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let mut conn = Connection::new(test_logger());
        conn.framer.feed(b"\r\n");
        conn.framer.feed(b"PING\r\n");
        conn.framer.end_of_tick();
        let msg = conn.recv_message().unwrap();
        assert_eq!(msg.command_text(), "PING");
        assert_eq!(conn.malformed_line_count(), 1);
    }
}
