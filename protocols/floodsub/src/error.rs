use std::{error, fmt, io};

/// Error of the floodsub router.
#[derive(Debug)]
pub enum FloodsubError {
    /// The router task is gone.
    Closed,
    /// A published message id is already in the seen cache.
    MessageAlreadySeen,
    /// A message failed validation (missing origin, seqno or topics).
    InvalidMessage,
    /// I/O towards a peer failed.
    Io(io::Error),
    /// A peer sent an undecodable RPC.
    Decode(prost::DecodeError),
}

impl fmt::Display for FloodsubError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FloodsubError::Closed => f.write_str("floodsub is closed"),
            FloodsubError::MessageAlreadySeen => f.write_str("message already seen"),
            FloodsubError::InvalidMessage => f.write_str("invalid message"),
            FloodsubError::Io(e) => write!(f, "i/o error: {}", e),
            FloodsubError::Decode(e) => write!(f, "rpc decode error: {}", e),
        }
    }
}

impl error::Error for FloodsubError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            FloodsubError::Io(e) => Some(e),
            FloodsubError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FloodsubError {
    fn from(e: io::Error) -> Self {
        FloodsubError::Io(e)
    }
}

impl From<prost::DecodeError> for FloodsubError {
    fn from(e: prost::DecodeError) -> Self {
        FloodsubError::Decode(e)
    }
}

impl From<futures::channel::mpsc::SendError> for FloodsubError {
    fn from(_: futures::channel::mpsc::SendError) -> Self {
        FloodsubError::Closed
    }
}

impl From<futures::channel::oneshot::Canceled> for FloodsubError {
    fn from(_: futures::channel::oneshot::Canceled) -> Self {
        FloodsubError::Closed
    }
}
