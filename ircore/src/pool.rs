//! Connection Pool, §4.F. Grounded on `original_source/src/goat.c` (sparse
//! connection array grown by a fixed increment, rwlock-guarded structural
//! changes, readiness wait released of the pool lock) and on
//! `neutronium::net::endpoint::Endpoint` for the mio-based registration/poll
//! loop shape.
use std::collections::HashMap;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use slog::{o, warn, Logger};

use crate::connection::Connection;
use crate::dispatch::{Callback, CallbackTable, EventKind};
use crate::error::ErrorKind;

pub type ConnectionHandle = usize;

/// Fd interest populated by `populate_fd_sets`/`select_fds`, for a host
/// application that wants to block on its own fds alongside the pool's
/// sockets instead of letting the pool's own `tick` do the readiness wait.
/// Mirrors `goat_select_fds` (`original_source/src/goat.c:263`): readable and
/// writable interest sets plus the highest fd seen, the three pieces a caller
/// needs to build `select(2)`-style `fd_set`s and an `nfds` argument.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct FdInterest {
    pub read_fds: Vec<RawFd>,
    pub write_fds: Vec<RawFd>,
    pub max_fd: Option<RawFd>,
}

impl FdInterest {
    fn note(&mut self, fd: RawFd) {
        self.max_fd = Some(self.max_fd.map_or(fd, |m| m.max(fd)));
    }
}

const ALLOC_INCREMENT: usize = 16;

struct Inner {
    slots: Vec<Option<Mutex<Connection>>>,
    free: Vec<ConnectionHandle>,
}

/// Multi-connection container exposing a single-threaded readiness interface
/// (`tick`) plus a `dispatch_events` pass, under reader-writer concurrency.
pub struct Pool {
    inner: RwLock<Inner>,
    callbacks: RwLock<CallbackTable>,
    poll: mio::Poll,
    registrations: Mutex<HashMap<ConnectionHandle, mio::Ready>>,
    logger: Logger,
}

impl Pool {
    pub fn new(logger: Logger) -> Result<Self, ErrorKind> {
        let poll = mio::Poll::new().map_err(|e| ErrorKind::Io(e.kind()))?;
        Ok(Pool {
            inner: RwLock::new(Inner {
                slots: Vec::new(),
                free: Vec::new(),
            }),
            callbacks: RwLock::new(CallbackTable::new()),
            poll,
            registrations: Mutex::new(HashMap::new()),
            logger,
        })
    }

    /// `connection_new`, §4.F: allocate a slot, initialize a DISCONNECTED
    /// `Connection`. Write-locked.
    pub fn connection_new(&self) -> Result<ConnectionHandle, ErrorKind> {
        let mut inner = self.inner.write().expect("pool lock poisoned");
        if let Some(handle) = inner.free.pop() {
            let child_logger = self.logger.new(o!("connection" => handle));
            inner.slots[handle] = Some(Mutex::new(Connection::new(child_logger)));
            return Ok(handle);
        }
        let base = inner.slots.len();
        inner.slots.resize_with(base + ALLOC_INCREMENT, || None);
        for offset in 1..ALLOC_INCREMENT {
            inner.free.push(base + offset);
        }
        let handle = base;
        let child_logger = self.logger.new(o!("connection" => handle));
        inner.slots[handle] = Some(Mutex::new(Connection::new(child_logger)));
        Ok(handle)
    }

    /// `connection_delete`, §4.F: close and free the connection, nulling its
    /// slot. Write-locked.
    pub fn connection_delete(&self, handle: ConnectionHandle) -> Result<(), ErrorKind> {
        let mut inner = self.inner.write().expect("pool lock poisoned");
        let slot = inner.slots.get_mut(handle).ok_or(ErrorKind::Inval)?;
        if slot.take().is_none() {
            return Err(ErrorKind::Inval);
        }
        self.registrations.lock().expect("registrations lock poisoned").remove(&handle);
        inner.free.push(handle);
        Ok(())
    }

    pub fn with_connection<T>(
        &self,
        handle: ConnectionHandle,
        f: impl FnOnce(&mut Connection) -> T,
    ) -> Result<T, ErrorKind> {
        let inner = self.inner.read().expect("pool lock poisoned");
        let slot = inner.slots.get(handle).and_then(Option::as_ref).ok_or(ErrorKind::Inval)?;
        let mut connection = slot.lock().expect("connection lock poisoned");
        Ok(f(&mut connection))
    }

    /// `install_callback`, §4.F. Write-locked.
    pub fn install_callback(&self, event: EventKind, callback: Callback) {
        self.callbacks.write().expect("callback lock poisoned").install(event, callback);
    }

    /// `uninstall_callback`, §4.F: fails with `Canceled` unless `callback` is the
    /// one currently installed. Write-locked.
    pub fn uninstall_callback(&self, event: EventKind, callback: &Callback) -> Result<(), ErrorKind> {
        self.callbacks.write().expect("callback lock poisoned").uninstall(event, callback)
    }

    /// `populate_fd_sets`/`select_fds`, §4.F/§6: for a host application that
    /// runs its own `select`-style event loop alongside this pool's sockets,
    /// rather than calling `tick` to perform the readiness wait internally.
    /// READ-locked; does not touch `self.poll` or block. Mirrors
    /// `goat_select_fds` (`original_source/src/goat.c:263`) exactly, including
    /// its read-then-unlock shape — unlike `tick`, there is no wait to release
    /// the lock across, so the whole scan runs under one read-lock hold.
    pub fn populate_fd_sets(&self) -> FdInterest {
        let inner = self.inner.read().expect("pool lock poisoned");
        let mut interest = FdInterest::default();
        for slot in inner.slots.iter().flatten() {
            let connection = slot.lock().expect("connection lock poisoned");
            let socket = match connection.registration_socket() {
                Some(s) => s,
                None => continue,
            };
            let fd = socket.as_raw_fd();
            if connection.wants_read() {
                interest.read_fds.push(fd);
                interest.note(fd);
            }
            if connection.wants_write() {
                interest.write_fds.push(fd);
                interest.note(fd);
            }
        }
        interest
    }

    /// Builds fd-set-equivalent registrations under the read lock, releases the
    /// lock, performs the blocking readiness wait with NO lock held, reacquires
    /// the read lock, ticks every connection, and returns the aggregate count of
    /// newly received complete lines. Mirrors `goat_tick`'s unlock-before-select.
    pub fn tick(&self, timeout: Option<Duration>) -> Result<usize, ErrorKind> {
        {
            let inner = self.inner.read().expect("pool lock poisoned");
            self.sync_registrations(&inner);
        } // read lock dropped before the blocking wait

        let mut events = mio::Events::with_capacity(1024);
        self.poll
            .poll(&mut events, timeout)
            .map_err(|e| ErrorKind::Io(e.kind()))?;

        let mut readiness: HashMap<ConnectionHandle, (bool, bool)> = HashMap::new();
        for event in &events {
            let handle = event.token().0;
            let entry = readiness.entry(handle).or_insert((false, false));
            if event.readiness().is_readable() {
                entry.0 = true;
            }
            if event.readiness().is_writable() {
                entry.1 = true;
            }
        }

        let inner = self.inner.read().expect("pool lock poisoned");
        let mut total_new = 0usize;
        for (handle, slot) in inner.slots.iter().enumerate() {
            let slot = match slot {
                Some(s) => s,
                None => continue,
            };
            let mut connection = slot.lock().expect("connection lock poisoned");
            let (readable, writable) = readiness.get(&handle).copied().unwrap_or((false, false));
            let before = connection_pending_count(&connection);
            connection.tick(readable, writable);
            let after = connection_pending_count(&connection);
            total_new += after.saturating_sub(before);
        }
        Ok(total_new)
    }

    /// `dispatch_events`, §4.F: under the read lock, drains every connection's
    /// received messages and invokes the registered callback for each.
    pub fn dispatch_events(&self) -> Result<(), ErrorKind> {
        let inner = self.inner.read().expect("pool lock poisoned");
        let callbacks = self.callbacks.read().expect("callback lock poisoned");
        for slot in inner.slots.iter().flatten() {
            let mut connection = slot.lock().expect("connection lock poisoned");
            while let Some(message) = connection.recv_message() {
                callbacks.dispatch(&message);
            }
        }
        Ok(())
    }

    fn sync_registrations(&self, inner: &Inner) {
        let mut registrations = self.registrations.lock().expect("registrations lock poisoned");
        for (handle, slot) in inner.slots.iter().enumerate() {
            let connection = match slot {
                Some(s) => s.lock().expect("connection lock poisoned"),
                None => {
                    if registrations.remove(&handle).is_some() {
                        // Socket is gone; mio drops interest automatically once
                        // the underlying fd is closed, nothing else to do here.
                    }
                    continue;
                }
            };
            let wanted = match (connection.wants_read(), connection.wants_write()) {
                (false, false) => None,
                (true, false) => Some(mio::Ready::readable()),
                (false, true) => Some(mio::Ready::writable()),
                (true, true) => Some(mio::Ready::readable() | mio::Ready::writable()),
            };
            let socket = connection.registration_socket();
            match (wanted, socket, registrations.get(&handle).copied()) {
                (Some(interest), Some(socket), None) => {
                    if let Err(e) = self.poll.register(
                        socket,
                        mio::Token(handle),
                        interest,
                        mio::PollOpt::edge(),
                    ) {
                        warn!(self.logger, "failed to register connection"; "handle" => handle, "error" => %e);
                        continue;
                    }
                    registrations.insert(handle, interest);
                }
                (Some(interest), Some(socket), Some(current)) if current != interest => {
                    if let Err(e) = self.poll.reregister(
                        socket,
                        mio::Token(handle),
                        interest,
                        mio::PollOpt::edge(),
                    ) {
                        warn!(self.logger, "failed to reregister connection"; "handle" => handle, "error" => %e);
                        continue;
                    }
                    registrations.insert(handle, interest);
                }
                (None, Some(socket), Some(_)) => {
                    let _ = self.poll.deregister(socket);
                    registrations.remove(&handle);
                }
                (None, None, Some(_)) => {
                    registrations.remove(&handle);
                }
                _ => {}
            }
        }
    }
}

fn connection_pending_count(connection: &Connection) -> usize {
    // Approximates "newly received messages" as the number of complete lines
    // currently sitting in the connection's receive queue; `recv_message`
    // later drains (and may discard malformed ones from) this same count.
    connection.pending_line_count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sloggers::{null::NullLoggerBuilder, Build};

    fn test_logger() -> Logger {
        NullLoggerBuilder.build().unwrap()
    }

    #[test]
    fn allocate_and_free_reuses_handles() {
        let pool = Pool::new(test_logger()).unwrap();
        let a = pool.connection_new().unwrap();
        pool.connection_delete(a).unwrap();
        let b = pool.connection_new().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn grows_by_fixed_increment_when_full() {
        let pool = Pool::new(test_logger()).unwrap();
        let mut handles = Vec::new();
        for _ in 0..ALLOC_INCREMENT + 1 {
            handles.push(pool.connection_new().unwrap());
        }
        assert_eq!(handles.len(), ALLOC_INCREMENT + 1);
        assert_eq!(handles[ALLOC_INCREMENT], ALLOC_INCREMENT);
    }

    #[test]
    fn delete_unknown_handle_is_inval() {
        let pool = Pool::new(test_logger()).unwrap();
        assert_eq!(pool.connection_delete(0), Err(ErrorKind::Inval));
    }

    #[test]
    fn with_connection_reports_initial_state() {
        let pool = Pool::new(test_logger()).unwrap();
        let handle = pool.connection_new().unwrap();
        let state = pool
            .with_connection(handle, |c| c.state())
            .unwrap();
        assert_eq!(state, crate::connection::State::Disconnected);
    }

    #[test]
    fn populate_fd_sets_is_empty_with_no_sockets() {
        let pool = Pool::new(test_logger()).unwrap();
        pool.connection_new().unwrap(); // DISCONNECTED: owns no socket yet
        let interest = pool.populate_fd_sets();
        assert!(interest.read_fds.is_empty());
        assert!(interest.write_fds.is_empty());
        assert_eq!(interest.max_fd, None);
    }
}
