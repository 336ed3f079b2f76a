use std::fmt;
use std::io;

/// Error taxonomy for the core. `None` is never constructed by fallible operations;
/// it exists so `Connection::last_error` has a healthy resting value.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    None,
    Inval,
    MsgLen,
    NoTag,
    NoTagVal,
    State,
    Resolv,
    Connect,
    Canceled,
    Io(io::ErrorKind),
}

pub type Result<T> = std::result::Result<T, ErrorKind>;

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::None => write!(f, "success"),
            ErrorKind::Inval => write!(f, "invalid argument"),
            ErrorKind::MsgLen => write!(f, "message or tag buffer exceeds protocol cap"),
            ErrorKind::NoTag => write!(f, "no such tag"),
            ErrorKind::NoTagVal => write!(f, "tag present without a value"),
            ErrorKind::State => write!(f, "connection reached an illegal state"),
            ErrorKind::Resolv => write!(f, "name resolution failed"),
            ErrorKind::Connect => write!(f, "connect failed"),
            ErrorKind::Canceled => write!(f, "callback mismatch on uninstall"),
            ErrorKind::Io(kind) => write!(f, "io error: {:?}", kind),
        }
    }
}

impl std::error::Error for ErrorKind {}

/// True for the two kinds of I/O result the FSM's tick loops treat as "nothing
/// went wrong, just stop for this tick" rather than a fatal error.
pub(crate) fn is_would_block(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

/// Distinguishes "try again, nothing went wrong" from every other I/O outcome.
/// Would-block is not part of `ErrorKind` because the FSM treats it as a normal
/// tick outcome, never as a connection error.
pub(crate) enum IoOutcome {
    WouldBlock,
    Fatal(ErrorKind),
}

impl From<io::Error> for IoOutcome {
    fn from(e: io::Error) -> Self {
        if is_would_block(&e) {
            IoOutcome::WouldBlock
        } else {
            IoOutcome::Fatal(ErrorKind::Io(e.kind()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_is_not_fatal() {
        let err = io::Error::new(io::ErrorKind::WouldBlock, "nope");
        match IoOutcome::from(err) {
            IoOutcome::WouldBlock => {}
            IoOutcome::Fatal(_) => panic!("would-block must not be fatal"),
        }
    }

    #[test]
    fn other_errors_are_fatal_io() {
        let err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        match IoOutcome::from(err) {
            IoOutcome::Fatal(ErrorKind::Io(io::ErrorKind::ConnectionReset)) => {}
            _ => panic!("expected Fatal(Io(ConnectionReset))"),
        }
    }
}
