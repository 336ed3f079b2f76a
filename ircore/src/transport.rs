//! Abstract secure transport, §6 ("the core consumes an abstract 'secure
//! transport' with the same read/write/handshake interface as plain sockets")
//! plus one concrete `rustls`-backed implementation, `SPEC_FULL.md` §4.I.
//!
//! Grounded on `kevinboulain-sin`, the only example repo with a TLS dependency;
//! unlike its blocking per-thread IMAP client, the handshake here is driven one
//! nonblocking step per tick rather than run to completion inline.
use std::convert::TryFrom;
use std::io::{self, Read, Write};
use std::sync::Arc;

use mio::net::TcpStream;

/// Same read/write shape as a plain nonblocking socket, plus a handshake the
/// connection state machine drives one step per tick.
pub trait Transport: Read + Write {
    fn is_handshaking(&self) -> bool;
    /// Drives one step of the handshake. Returns `Ok(true)` once complete.
    /// `WouldBlock` is a normal "not yet" outcome, not a failure.
    fn drive_handshake(&mut self) -> io::Result<bool>;
}

impl Transport for TcpStream {
    fn is_handshaking(&self) -> bool {
        false
    }

    fn drive_handshake(&mut self) -> io::Result<bool> {
        Ok(true)
    }
}

/// Builds a `rustls::ClientConfig` trusting the platform's native root store.
pub fn native_tls_config() -> io::Result<Arc<rustls::ClientConfig>> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs()? {
        // Malformed individual certs are skipped rather than failing the whole
        // config; a handful of unparsable system certs is common in practice.
        let _ = roots.add(&rustls::Certificate(cert.0));
    }
    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

pub struct RustlsTransport {
    conn: rustls::ClientConnection,
    socket: TcpStream,
}

impl RustlsTransport {
    pub fn new(
        config: Arc<rustls::ClientConfig>,
        host: &str,
        socket: TcpStream,
    ) -> Result<Self, crate::error::ErrorKind> {
        let server_name = rustls::ServerName::try_from(host)
            .map_err(|_| crate::error::ErrorKind::Connect)?;
        let conn = rustls::ClientConnection::new(config, server_name)
            .map_err(|_| crate::error::ErrorKind::Connect)?;
        Ok(RustlsTransport { conn, socket })
    }

    fn stream(&mut self) -> rustls::Stream<'_, rustls::ClientConnection, TcpStream> {
        rustls::Stream::new(&mut self.conn, &mut self.socket)
    }

    pub fn socket(&self) -> &TcpStream {
        &self.socket
    }
}

impl Read for RustlsTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream().read(buf)
    }
}

impl Write for RustlsTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream().flush()
    }
}

impl Transport for RustlsTransport {
    fn is_handshaking(&self) -> bool {
        self.conn.is_handshaking()
    }

    fn drive_handshake(&mut self) -> io::Result<bool> {
        if !self.conn.is_handshaking() {
            return Ok(true);
        }
        self.conn.complete_io(&mut self.socket)?;
        Ok(!self.conn.is_handshaking())
    }
}
