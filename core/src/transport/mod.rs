//! The transport abstraction: an address-dialable source of duplex byte
//! pipes, plus the upgrader that layers security and muxing on top.

pub mod memory;
pub mod upgrade;

use crate::multistream::NegotiationError;
use crate::Multiaddr;
use async_trait::async_trait;
use std::{error, fmt, io};

/// Addresses of the two ends of an established connection.
pub trait ConnectionInfo {
    /// The multiaddr on our side of the connection.
    fn local_multiaddr(&self) -> Multiaddr;

    /// The multiaddr on the remote side of the connection.
    fn remote_multiaddr(&self) -> Multiaddr;
}

/// A transport provides connection-oriented communication between two peers.
///
/// Connections are established either by listening or by dialing. All I/O
/// of the resulting sockets goes through [`ReadEx`](meshlink_traits::ReadEx)
/// / [`WriteEx`](meshlink_traits::WriteEx).
#[async_trait]
pub trait Transport: Send {
    /// The socket this transport produces.
    type Output: Send;

    /// The listener produced by `listen_on`.
    type Listener: TransportListener<Output = Self::Output>;

    /// Listens on the given multiaddr.
    fn listen_on(self, addr: Multiaddr) -> Result<Self::Listener, TransportError>;

    /// Dials the given multiaddr.
    async fn dial(self, addr: Multiaddr) -> Result<Self::Output, TransportError>;
}

/// An object that accepts inbound connections for a [`Transport`].
#[async_trait]
pub trait TransportListener: Send {
    /// The socket this listener yields.
    type Output: Send;

    /// Waits for and returns the next inbound connection.
    async fn accept(&mut self) -> Result<Self::Output, TransportError>;

    /// The multiaddr this listener is bound to.
    fn multi_addr(&self) -> Multiaddr;
}

/// Errors raised while establishing or upgrading a connection.
#[derive(Debug)]
pub enum TransportError {
    /// An I/O error on the underlying socket.
    Io(io::Error),
    /// The given multiaddr is not understood by this transport.
    MultiaddrNotSupported(Multiaddr),
    /// Nobody is reachable at the given address.
    Unreachable(Multiaddr),
    /// A handshake did not finish within its time budget.
    Timeout,
    /// Multistream-select could not agree on a protocol.
    Negotiation(NegotiationError),
    /// The secure channel handshake failed.
    Security(Box<dyn error::Error + Send + Sync>),
    /// The stream muxer failed.
    StreamMuxer(Box<dyn error::Error + Send + Sync>),
    /// Catch-all for violations of internal invariants.
    Internal,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "i/o error: {}", e),
            TransportError::MultiaddrNotSupported(a) => write!(f, "multiaddr not supported: {}", a),
            TransportError::Unreachable(a) => write!(f, "unreachable: {}", a),
            TransportError::Timeout => f.write_str("handshake timeout"),
            TransportError::Negotiation(e) => write!(f, "negotiation error: {}", e),
            TransportError::Security(e) => write!(f, "security error: {}", e),
            TransportError::StreamMuxer(e) => write!(f, "stream muxer error: {}", e),
            TransportError::Internal => f.write_str("internal error"),
        }
    }
}

impl error::Error for TransportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            TransportError::Negotiation(e) => Some(e),
            TransportError::Security(e) => Some(&**e),
            TransportError::StreamMuxer(e) => Some(&**e),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}

impl From<NegotiationError> for TransportError {
    fn from(e: NegotiationError) -> Self {
        TransportError::Negotiation(e)
    }
}
