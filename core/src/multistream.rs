//! Multistream-select: one-protocol-per-stream negotiation.
//!
//! Both sides first exchange the `/multistream/1.0.0` header. The initiator
//! then proposes protocol names one at a time; the listener echoes a name it
//! supports or answers `na`. Every message on the wire is a varint
//! length-prefixed UTF-8 string terminated by `\n`, the newline being counted
//! in the length.

use crate::upgrade::ProtocolName;
use crate::varint;
use log::{debug, trace};
use meshlink_traits::{ReadEx, WriteEx};
use smallvec::SmallVec;
use std::{error, fmt, io};

const MSG_MULTISTREAM_1_0: &[u8] = b"/multistream/1.0.0\n";
const MSG_PROTOCOL_NA: &[u8] = b"na\n";

/// The maximum length of an accepted negotiation message.
const MAX_MESSAGE_LEN: u64 = 1024;

/// Error that can happen when negotiating a protocol with the remote.
#[derive(Debug)]
pub enum NegotiationError {
    /// The remote end rejected every protocol we proposed.
    Failed,
    /// Error in the underlying stream or a violation of the negotiation
    /// protocol itself.
    ProtocolError(io::Error),
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NegotiationError::Failed => f.write_str("no supported protocol"),
            NegotiationError::ProtocolError(e) => write!(f, "negotiation protocol error: {}", e),
        }
    }
}

impl error::Error for NegotiationError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            NegotiationError::Failed => None,
            NegotiationError::ProtocolError(e) => Some(e),
        }
    }
}

impl From<io::Error> for NegotiationError {
    fn from(e: io::Error) -> NegotiationError {
        NegotiationError::ProtocolError(e)
    }
}

async fn send_message<T: WriteEx + Unpin>(io: &mut T, msg: &[u8]) -> io::Result<()> {
    varint::write_u64(io, msg.len() as u64).await?;
    io.write_all2(msg).await?;
    io.flush2().await
}

async fn recv_message<T: ReadEx + Unpin>(io: &mut T) -> io::Result<Vec<u8>> {
    let len = varint::read_u64(io).await?;
    if len == 0 || len > MAX_MESSAGE_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("negotiation message of {} bytes", len),
        ));
    }
    let mut msg = vec![0u8; len as usize];
    io.read_exact2(&mut msg).await?;
    if msg.last() != Some(&b'\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "negotiation message not newline-terminated",
        ));
    }
    Ok(msg)
}

async fn exchange_header<T: ReadEx + WriteEx + Unpin>(io: &mut T) -> Result<(), NegotiationError> {
    send_message(io, MSG_MULTISTREAM_1_0).await?;
    let header = recv_message(io).await?;
    if header != MSG_MULTISTREAM_1_0 {
        debug!("unexpected multistream header: {:?}", header);
        return Err(NegotiationError::ProtocolError(io::Error::new(
            io::ErrorKind::InvalidData,
            "bad multistream header",
        )));
    }
    Ok(())
}

/// Negotiates a protocol on a freshly opened stream.
///
/// The protocols given first have a higher priority when we are the
/// initiator.
#[derive(Clone, Debug)]
pub struct Negotiator<TProto> {
    protocols: SmallVec<[TProto; 4]>,
    /// When set, an incoming proposal is accepted if it starts with one of
    /// our announced names instead of matching it exactly.
    prefix_match: bool,
}

impl<TProto: ProtocolName + Clone> Negotiator<TProto> {
    pub fn new() -> Self {
        Negotiator {
            protocols: SmallVec::new(),
            prefix_match: false,
        }
    }

    pub fn new_with_protocols(protocols: Vec<TProto>) -> Self {
        Negotiator {
            protocols: protocols.into(),
            prefix_match: false,
        }
    }

    /// Switches the listener side from strict name equality to prefix
    /// acceptance: a proposal matches an announced name that it starts with.
    pub fn prefix_match(mut self) -> Self {
        self.prefix_match = true;
        self
    }

    pub fn add_protocol(&mut self, proto: TProto) {
        self.protocols.push(proto);
    }

    /// Runs the initiator side: proposes our protocols in order and returns
    /// the first one the remote accepts.
    pub async fn select_one<T>(&self, mut io: T) -> Result<(TProto, T), NegotiationError>
    where
        T: ReadEx + WriteEx + Unpin,
    {
        exchange_header(&mut io).await?;

        for proto in &self.protocols {
            let mut msg = proto.protocol_name().to_vec();
            msg.push(b'\n');
            send_message(&mut io, &msg).await?;

            let reply = recv_message(&mut io).await?;
            if reply == msg {
                trace!("selected outbound {}", proto.protocol_name_str());
                return Ok((proto.clone(), io));
            }
            if reply == MSG_PROTOCOL_NA {
                trace!("{} not supported by remote, trying next", proto.protocol_name_str());
                continue;
            }
            return Err(NegotiationError::ProtocolError(io::Error::new(
                io::ErrorKind::InvalidData,
                "unexpected negotiation reply",
            )));
        }
        Err(NegotiationError::Failed)
    }

    /// Runs the listener side: answers proposals until one matches a protocol
    /// we announce.
    pub async fn negotiate<T>(&self, mut io: T) -> Result<(TProto, T), NegotiationError>
    where
        T: ReadEx + WriteEx + Unpin,
    {
        exchange_header(&mut io).await?;

        loop {
            let msg = recv_message(&mut io).await?;
            let candidate = &msg[..msg.len() - 1];

            let found = self.protocols.iter().find(|p| {
                if self.prefix_match {
                    candidate.starts_with(p.protocol_name())
                } else {
                    candidate == p.protocol_name()
                }
            });

            match found {
                Some(proto) => {
                    send_message(&mut io, &msg).await?;
                    trace!("selected inbound {}", proto.protocol_name_str());
                    return Ok((proto.clone(), io));
                }
                None => {
                    trace!("unsupported proposal {:?}, answering na", candidate);
                    send_message(&mut io, MSG_PROTOCOL_NA).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::Channel;
    use async_std::task;

    fn pipe() -> (Channel, Channel) {
        Channel::pair()
    }

    #[test]
    fn select_first_common() {
        let (a, b) = pipe();
        let initiator = task::spawn(async move {
            let neg = Negotiator::new_with_protocols(vec![b"/quark/1.0.0" as &[u8], b"/ping/1.0.0"]);
            neg.select_one(a).await
        });
        let listener = task::spawn(async move {
            let neg = Negotiator::new_with_protocols(vec![b"/ping/1.0.0" as &[u8]]);
            neg.negotiate(b).await
        });
        task::block_on(async move {
            let (proto_i, _) = initiator.await.expect("initiator succeeds");
            let (proto_l, _) = listener.await.expect("listener succeeds");
            assert_eq!(proto_i, b"/ping/1.0.0");
            assert_eq!(proto_l, b"/ping/1.0.0");
        });
    }

    #[test]
    fn select_exhausted_fails() {
        let (a, b) = pipe();
        let initiator = task::spawn(async move {
            let neg = Negotiator::new_with_protocols(vec![b"/quark/1.0.0" as &[u8]]);
            neg.select_one(a).await
        });
        // listener announces nothing in common and then sees the stream drop
        let listener = task::spawn(async move {
            let neg = Negotiator::new_with_protocols(vec![b"/ping/1.0.0" as &[u8]]);
            neg.negotiate(b).await
        });
        task::block_on(async move {
            match initiator.await {
                Err(NegotiationError::Failed) => {}
                other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
            }
            assert!(listener.await.is_err());
        });
    }

    #[test]
    fn prefix_acceptance() {
        let (a, b) = pipe();
        let initiator = task::spawn(async move {
            let neg = Negotiator::new_with_protocols(vec![b"/echo/1.3.5" as &[u8]]);
            neg.select_one(a).await
        });
        let listener = task::spawn(async move {
            let neg = Negotiator::new_with_protocols(vec![b"/echo/1." as &[u8]]).prefix_match();
            neg.negotiate(b).await
        });
        task::block_on(async move {
            let (proto_i, _) = initiator.await.expect("initiator succeeds");
            assert_eq!(proto_i, b"/echo/1.3.5");
            let (proto_l, _) = listener.await.expect("listener succeeds");
            assert_eq!(proto_l, b"/echo/1.");
        });
    }
}
