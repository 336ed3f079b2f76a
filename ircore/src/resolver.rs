//! Abstract DNS resolution, §6 ("an abstract resolver returning either 'pending',
//! 'ready with endpoint list', or 'failed'") plus one concrete implementation,
//! `SPEC_FULL.md` §4.H.
use std::net::{SocketAddr, ToSocketAddrs};
use std::thread;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ResolveStatus {
    Pending,
    Ready(Vec<SocketAddr>),
    Failed,
}

/// Polled once per tick while a connection is in `RESOLVING`. Implementors must
/// never block in `poll`.
pub trait Resolver: Send {
    fn poll(&mut self) -> ResolveStatus;
}

/// Resolves on a dedicated OS thread (grounded on `semi-hsms-rs`'s `oneshot`
/// dependency) so the driver thread's `poll` never blocks on `getaddrinfo`.
pub struct ThreadResolver {
    receiver: Option<oneshot::Receiver<std::io::Result<Vec<SocketAddr>>>>,
}

impl ThreadResolver {
    pub fn spawn(host: String, port: u16) -> Self {
        let (tx, rx) = oneshot::channel();
        thread::spawn(move || {
            let result = (host.as_str(), port)
                .to_socket_addrs()
                .map(|addrs| addrs.collect());
            let _ = tx.send(result);
        });
        ThreadResolver { receiver: Some(rx) }
    }
}

impl Resolver for ThreadResolver {
    fn poll(&mut self) -> ResolveStatus {
        let receiver = match &self.receiver {
            Some(r) => r,
            None => return ResolveStatus::Failed,
        };
        match receiver.try_recv() {
            Ok(Ok(addrs)) if !addrs.is_empty() => {
                self.receiver = None;
                ResolveStatus::Ready(addrs)
            }
            Ok(Ok(_)) | Ok(Err(_)) => {
                self.receiver = None;
                ResolveStatus::Failed
            }
            Err(oneshot::TryRecvError::Empty) => ResolveStatus::Pending,
            Err(oneshot::TryRecvError::Disconnected) => {
                self.receiver = None;
                ResolveStatus::Failed
            }
        }
    }
}
