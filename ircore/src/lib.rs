//! IRC client-library core: resolve, connect, codec, and event dispatch over a
//! pool of nonblocking connections. Grounded on `original_source/src/goat.c`'s
//! public surface (`goat_context_new`, `goat_connection_new`, `goat_tick`,
//! `goat_dispatch_events`, `goat_install_callback`), expressed as idiomatic
//! `Result`-returning methods on `Context` rather than out-parameters.
pub mod command;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod framer;
pub mod message;
pub mod pool;
pub mod resolver;
pub mod tags;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use slog::Logger;

pub use command::CommandId;
pub use connection::State as ConnectionState;
pub use dispatch::{Callback, EventKind, GENERIC};
pub use error::ErrorKind;
pub use message::{Message, MessageBuilder};
pub use pool::{ConnectionHandle, FdInterest};
pub use tags::{TagLookup, TagMap};
pub use transport::native_tls_config;

/// Top-level handle a driver application holds: one logger, one connection pool.
/// Mirrors `goat_context_t` (`original_source/src/goat.c`).
pub struct Context {
    pool: pool::Pool,
}

impl Context {
    /// `context_new`, §6: builds a `Pool` backed by a single `mio::Poll`.
    pub fn new(logger: Logger) -> Result<Self, ErrorKind> {
        Ok(Context {
            pool: pool::Pool::new(logger)?,
        })
    }

    /// `connection_new`, §4.F/§6: allocates a new, disconnected connection slot.
    pub fn connection_new(&self) -> Result<ConnectionHandle, ErrorKind> {
        self.pool.connection_new()
    }

    /// `connection_delete`, §6: frees a connection slot, closing its socket if any.
    pub fn connection_delete(&self, handle: ConnectionHandle) -> Result<(), ErrorKind> {
        self.pool.connection_delete(handle)
    }

    /// `connect(handle, host, port, secure)`, §6: DISCONNECTED -> RESOLVING for the
    /// given connection. `secure` is `None` for a plain socket, or a shared
    /// `rustls::ClientConfig` (see `native_tls_config`) to upgrade to TLS once
    /// connected.
    pub fn connect(
        &self,
        handle: ConnectionHandle,
        host: &str,
        port: u16,
        secure: Option<Arc<rustls::ClientConfig>>,
    ) -> Result<(), ErrorKind> {
        self.pool
            .with_connection(handle, |c| c.connect(host, port, secure))?
    }

    /// `disconnect(handle)`, §6: requests a graceful close on the next tick.
    pub fn disconnect(&self, handle: ConnectionHandle) -> Result<(), ErrorKind> {
        self.pool.with_connection(handle, |c| c.disconnect())
    }

    /// `error(handle)`/`reset_error(handle)`, §6.
    pub fn error(&self, handle: ConnectionHandle) -> Result<ErrorKind, ErrorKind> {
        self.pool.with_connection(handle, |c| c.last_error())
    }

    pub fn reset_error(&self, handle: ConnectionHandle) -> Result<(), ErrorKind> {
        self.pool.with_connection(handle, |c| c.reset_error())
    }

    pub fn state(&self, handle: ConnectionHandle) -> Result<ConnectionState, ErrorKind> {
        self.pool.with_connection(handle, |c| c.state())
    }

    /// `send_message(handle, message)`, §6: enqueues `message` for sending. Only
    /// legal while the connection is CONNECTED.
    pub fn send_message(&self, handle: ConnectionHandle, message: &Message) -> Result<(), ErrorKind> {
        self.pool.with_connection(handle, |c| c.queue_message(message))?
    }

    /// `tick(timeout)`, §5/§6: one readiness wait across every connection in the
    /// pool, driving each connection's state machine. Returns the number of newly
    /// received complete messages across all connections.
    pub fn tick(&self, timeout: Option<Duration>) -> Result<usize, ErrorKind> {
        self.pool.tick(timeout)
    }

    /// `select_fds(context, readfds, writefds)`, §4.F/§6: populates fd interest
    /// for a host application that integrates the pool's sockets into its own
    /// `select`-style event loop instead of calling `tick`. Does not perform a
    /// readiness wait itself.
    pub fn select_fds(&self) -> FdInterest {
        self.pool.populate_fd_sets()
    }

    /// `dispatch_events()`, §6: drains every connection's received messages through
    /// the installed callback table.
    pub fn dispatch_events(&self) -> Result<(), ErrorKind> {
        self.pool.dispatch_events()
    }

    /// `install_callback(event, callback)`, §6.
    pub fn install_callback(&self, event: EventKind, callback: Callback) {
        self.pool.install_callback(event, callback)
    }

    /// `uninstall_callback(event, callback)`, §6: fails with `Canceled` unless
    /// `callback` is the one currently installed for `event`.
    pub fn uninstall_callback(&self, event: EventKind, callback: &Callback) -> Result<(), ErrorKind> {
        self.pool.uninstall_callback(event, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sloggers::{null::NullLoggerBuilder, Build};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_logger() -> Logger {
        NullLoggerBuilder.build().unwrap()
    }

    #[test]
    fn connection_lifecycle_allocates_and_frees() {
        let ctx = Context::new(test_logger()).unwrap();
        let handle = ctx.connection_new().unwrap();
        assert_eq!(ctx.state(handle).unwrap(), ConnectionState::Disconnected);
        ctx.connection_delete(handle).unwrap();
        assert_eq!(ctx.state(handle), Err(ErrorKind::Inval));
    }

    #[test]
    fn send_message_rejected_before_connect() {
        let ctx = Context::new(test_logger()).unwrap();
        let handle = ctx.connection_new().unwrap();
        let msg = MessageBuilder::new("PING").build().unwrap();
        assert_eq!(ctx.send_message(handle, &msg), Err(ErrorKind::State));
    }

    #[test]
    fn install_and_uninstall_generic_callback() {
        let ctx = Context::new(test_logger()).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let callback: Callback = {
            let hits = hits.clone();
            Arc::new(move |_: &Message| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        ctx.install_callback(GENERIC, callback.clone());
        assert!(ctx.uninstall_callback(GENERIC, &callback).is_ok());
        let other: Callback = Arc::new(|_| {});
        assert_eq!(ctx.uninstall_callback(GENERIC, &other), Err(ErrorKind::Canceled));
    }

    #[test]
    fn tick_with_no_connections_is_a_timed_out_noop() {
        let ctx = Context::new(test_logger()).unwrap();
        let new_messages = ctx.tick(Some(Duration::from_millis(10))).unwrap();
        assert_eq!(new_messages, 0);
    }
}
