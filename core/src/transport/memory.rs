//! An in-process transport: listeners live in a process-global registry
//! keyed by `/memory/<port>` addresses, and dialing produces a cross-task
//! duplex pipe. This is the concrete "abstract byte pipe" used by tests and
//! demos.

use crate::transport::{ConnectionInfo, Transport, TransportError, TransportListener};
use crate::Multiaddr;
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use lazy_static::lazy_static;
use log::trace;
use meshlink_multiaddr::Protocol;
use meshlink_traits::{ReadEx, SplitEx, WriteEx};
use std::collections::hash_map::{Entry, HashMap};
use std::{io, sync::Mutex};

lazy_static! {
    static ref HUB: Mutex<HashMap<u64, mpsc::UnboundedSender<Channel>>> = Mutex::new(HashMap::new());
}

fn memory_port(addr: &Multiaddr) -> Result<u64, TransportError> {
    let mut iter = addr.iter();
    match (iter.next(), iter.next()) {
        (Some(Protocol::Memory(port)), None) => Ok(port),
        _ => Err(TransportError::MultiaddrNotSupported(addr.clone())),
    }
}

/// A [`Transport`] connecting exclusively within the local process.
#[derive(Debug, Copy, Clone, Default)]
pub struct MemoryTransport;

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Output = Channel;
    type Listener = MemoryListener;

    fn listen_on(self, addr: Multiaddr) -> Result<Self::Listener, TransportError> {
        let mut port = memory_port(&addr)?;
        let mut hub = HUB.lock().expect("memory hub lock");

        if port == 0 {
            // pick an unused port
            loop {
                port = rand::random::<u64>().saturating_add(1);
                if !hub.contains_key(&port) {
                    break;
                }
            }
        }

        let (tx, rx) = mpsc::unbounded();
        match hub.entry(port) {
            Entry::Occupied(_) => return Err(TransportError::MultiaddrNotSupported(addr)),
            Entry::Vacant(e) => e.insert(tx),
        };

        trace!("memory transport listening on port {}", port);
        Ok(MemoryListener {
            addr: Protocol::Memory(port).into(),
            port,
            incoming: rx,
        })
    }

    async fn dial(self, addr: Multiaddr) -> Result<Self::Output, TransportError> {
        let port = memory_port(&addr)?;

        let listener = {
            let hub = HUB.lock().expect("memory hub lock");
            hub.get(&port).cloned()
        };
        let listener = listener.ok_or_else(|| TransportError::Unreachable(addr.clone()))?;

        let dialer_addr: Multiaddr = Protocol::Memory(0).into();
        let listener_addr: Multiaddr = Protocol::Memory(port).into();
        let (ours, theirs) =
            Channel::pair_with_addrs(dialer_addr, listener_addr);

        listener
            .unbounded_send(theirs)
            .map_err(|_| TransportError::Unreachable(addr))?;

        Ok(ours)
    }
}

/// Listener half of the memory transport.
pub struct MemoryListener {
    addr: Multiaddr,
    port: u64,
    incoming: mpsc::UnboundedReceiver<Channel>,
}

#[async_trait]
impl TransportListener for MemoryListener {
    type Output = Channel;

    async fn accept(&mut self) -> Result<Self::Output, TransportError> {
        self.incoming.next().await.ok_or(TransportError::Internal)
    }

    fn multi_addr(&self) -> Multiaddr {
        self.addr.clone()
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        HUB.lock().expect("memory hub lock").remove(&self.port);
    }
}

/// One end of an in-process duplex pipe.
pub struct Channel {
    reader: ChannelReader,
    writer: ChannelWriter,
    la: Multiaddr,
    ra: Multiaddr,
}

impl Channel {
    /// Builds a connected pair of channels with empty addresses. Useful as a
    /// loopback pipe in tests.
    pub fn pair() -> (Channel, Channel) {
        Channel::pair_with_addrs(Multiaddr::empty(), Multiaddr::empty())
    }

    fn pair_with_addrs(a_addr: Multiaddr, b_addr: Multiaddr) -> (Channel, Channel) {
        let (a_tx, b_rx) = mpsc::unbounded();
        let (b_tx, a_rx) = mpsc::unbounded();
        let a = Channel {
            reader: ChannelReader {
                incoming: a_rx,
                buf: Vec::new(),
            },
            writer: ChannelWriter { outgoing: a_tx },
            la: a_addr.clone(),
            ra: b_addr.clone(),
        };
        let b = Channel {
            reader: ChannelReader {
                incoming: b_rx,
                buf: Vec::new(),
            },
            writer: ChannelWriter { outgoing: b_tx },
            la: b_addr,
            ra: a_addr,
        };
        (a, b)
    }
}

impl ConnectionInfo for Channel {
    fn local_multiaddr(&self) -> Multiaddr {
        self.la.clone()
    }

    fn remote_multiaddr(&self) -> Multiaddr {
        self.ra.clone()
    }
}

#[async_trait]
impl ReadEx for Channel {
    async fn read2(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read2(buf).await
    }
}

#[async_trait]
impl WriteEx for Channel {
    async fn write2(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write2(buf).await
    }

    async fn flush2(&mut self) -> io::Result<()> {
        self.writer.flush2().await
    }

    async fn close2(&mut self) -> io::Result<()> {
        self.writer.close2().await
    }
}

impl SplitEx for Channel {
    type Reader = ChannelReader;
    type Writer = ChannelWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (self.reader, self.writer)
    }
}

/// Read half of a [`Channel`].
pub struct ChannelReader {
    incoming: mpsc::UnboundedReceiver<Vec<u8>>,
    buf: Vec<u8>,
}

#[async_trait]
impl ReadEx for ChannelReader {
    async fn read2(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.buf.is_empty() {
            match self.incoming.next().await {
                Some(chunk) => self.buf = chunk,
                None => return Ok(0), // remote closed
            }
        }
        let n = ::std::cmp::min(buf.len(), self.buf.len());
        buf[..n].copy_from_slice(&self.buf[..n]);
        self.buf.drain(..n);
        Ok(n)
    }
}

/// Write half of a [`Channel`].
pub struct ChannelWriter {
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl WriteEx for ChannelWriter {
    async fn write2(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.outgoing
            .unbounded_send(buf.to_vec())
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(buf.len())
    }

    async fn flush2(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn close2(&mut self) -> io::Result<()> {
        self.outgoing.close_channel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_std::task;

    #[test]
    fn port_parsing() {
        let addr: Multiaddr = "/memory/5".parse().unwrap();
        assert_eq!(memory_port(&addr).unwrap(), 5);
        let addr: Multiaddr = "/ip4/1.2.3.4/tcp/5".parse().unwrap();
        assert!(memory_port(&addr).is_err());
    }

    #[test]
    fn dial_unbound_port_is_unreachable() {
        task::block_on(async {
            let res = MemoryTransport::new().dial("/memory/879128764".parse().unwrap()).await;
            assert!(matches!(res, Err(TransportError::Unreachable(_))));
        });
    }

    #[test]
    fn communicating_between_dialer_and_listener() {
        let msg = [1u8, 2, 3];
        let rand_port = rand::random::<u64>().saturating_add(1);
        let addr: Multiaddr = format!("/memory/{}", rand_port).parse().unwrap();
        let cloned_addr = addr.clone();

        let listener = task::spawn(async move {
            let mut listener = MemoryTransport::new().listen_on(addr).unwrap();
            let mut socket = listener.accept().await.unwrap();
            let mut buf = [0u8; 3];
            socket.read_exact2(&mut buf).await.unwrap();
            buf
        });

        task::block_on(async move {
            // give the listener a moment to register
            task::sleep(::std::time::Duration::from_millis(50)).await;
            let mut socket = MemoryTransport::new().dial(cloned_addr).await.unwrap();
            socket.write_all2(&msg).await.unwrap();
            assert_eq!(listener.await, msg);
        });
    }

    #[test]
    fn pair_is_duplex() {
        task::block_on(async {
            let (mut a, mut b) = Channel::pair();
            a.write_all2(b"ping").await.unwrap();
            b.write_all2(b"pong").await.unwrap();
            let mut buf = [0u8; 4];
            b.read_exact2(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");
            a.read_exact2(&mut buf).await.unwrap();
            assert_eq!(&buf, b"pong");
        });
    }
}
