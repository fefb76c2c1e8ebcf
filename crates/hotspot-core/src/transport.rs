//! Transport contract
//!
//! A transport is one accepted TCP connection as the network stack exposes
//! it: writes are copied into the stack, consumed bytes are acknowledged back
//! for flow control, and events arrive through hooks registered per
//! connection. Hook registration is held as a [`Registration`] that has to be
//! consumed before a session goes away.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Identifies one accepted connection for event dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Failures reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection was aborted, locally or by the stack
    #[error("connection aborted")]
    Aborted,

    /// Peer reset the connection
    #[error("connection reset by peer")]
    Reset,

    /// Connection is already closed
    #[error("connection closed")]
    Closed,

    /// Stack could not queue the data
    #[error("out of memory")]
    OutOfMemory,

    /// Any other socket failure
    #[error("I/O error: {0:?}")]
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset => TransportError::Reset,
            ErrorKind::ConnectionAborted => TransportError::Aborted,
            ErrorKind::NotConnected | ErrorKind::BrokenPipe => TransportError::Closed,
            ErrorKind::OutOfMemory => TransportError::OutOfMemory,
            kind => TransportError::Io(kind),
        }
    }
}

/// Result reported when a connection is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseSignal {
    /// Orderly close
    Ok,
    /// Request line was rejected
    Argument,
    /// Response did not fit its buffer
    Closed,
    /// Orderly close failed and the connection was aborted
    Aborted,
    /// Transport failure passed through
    Transport(TransportError),
}

impl fmt::Display for CloseSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseSignal::Ok => f.write_str("ok"),
            CloseSignal::Argument => f.write_str("illegal argument"),
            CloseSignal::Closed => f.write_str("closed"),
            CloseSignal::Aborted => f.write_str("aborted"),
            CloseSignal::Transport(err) => write!(f, "{err}"),
        }
    }
}

/// One accepted connection in the network stack
pub trait Transport {
    /// Install the data-received, sent, poll and error hooks.
    /// Poll fires after `poll_interval` without activity.
    fn register(&mut self, poll_interval: Duration);

    /// Remove all hooks; nothing is delivered for this connection afterwards
    fn unregister(&mut self);

    /// Queue bytes for sending; the transport copies them
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Tell the stack `len` received bytes were consumed
    fn recved(&mut self, len: usize);

    /// Orderly close
    fn close(&mut self) -> Result<(), TransportError>;

    /// Drop the connection immediately; no hook fires afterwards
    fn abort(&mut self);

    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// Proof that hooks are installed on a transport.
///
/// Not clonable. It leaves a session only through [`Registration::revoke`],
/// which unregisters the hooks, or [`Registration::forfeit`] when the
/// transport has already discarded the connection.
#[must_use = "hooks stay installed until the registration is revoked"]
#[derive(Debug)]
pub struct Registration {
    id: ConnectionId,
}

impl Registration {
    /// Install hooks on `transport` for connection `id`
    pub fn register<T: Transport>(transport: &mut T, id: ConnectionId, poll_interval: Duration) -> Self {
        transport.register(poll_interval);
        Self { id }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remove the hooks from `transport`
    pub fn revoke<T: Transport>(self, transport: &mut T) {
        transport.unregister();
    }

    /// Give up the registration without touching the transport
    pub fn forfeit(self) {}
}
