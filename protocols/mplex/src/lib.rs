// Copyright 2020 Netwarps Ltd.
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! The mplex stream multiplexer: one encrypted connection carries many
//! logical streams, framed by `(stream_id << 3) | tag` varint headers.

pub mod connection;
pub mod error;
pub mod frame;

use async_trait::async_trait;
use futures::FutureExt;
use log::{info, trace};
use std::fmt;

use crate::connection::{control::Control, stream::Stream, Connection, Mode};
use crate::error::ConnectionError;
use futures::future::BoxFuture;
use meshlink_core::identity::Keypair;
use meshlink_core::muxing::{IReadWrite, IStreamMuxer, ReadWriteEx, StreamInfo, StreamMuxer, StreamMuxerEx};
use meshlink_core::secure_io::SecureInfo;
use meshlink_core::transport::{ConnectionInfo, TransportError};
use meshlink_core::upgrade::{UpgradeInfo, Upgrader};
use meshlink_core::{Multiaddr, PeerId, PublicKey};
use meshlink_traits::SplitEx;
use meshlink_traits::SplittableReadWrite;

/// Mplex configuration. The protocol has no knobs; the type exists to be an
/// [`Upgrader`].
#[derive(Debug, Clone, Default)]
pub struct Config {}

impl Config {
    pub fn new() -> Self {
        Config {}
    }
}

/// An mplex connection bound to the muxer interface.
pub struct Mplex<C: SplitEx> {
    /// The connection, until its background task is taken.
    connection: Option<Connection<C>>,
    /// Handle to control the connection.
    control: Control,
    /// For debug purpose.
    id: connection::Id,
    /// The secure & connection info provided by the underlying socket; the
    /// socket itself is moved into the connection, so a copy is kept.
    la: Multiaddr,
    ra: Multiaddr,
    local_priv_key: Keypair,
    local_peer_id: PeerId,
    remote_pub_key: PublicKey,
    remote_peer_id: PeerId,
}

impl<C: SplitEx> Clone for Mplex<C> {
    fn clone(&self) -> Self {
        Mplex {
            connection: None,
            control: self.control.clone(),
            id: self.id,
            la: self.la.clone(),
            ra: self.ra.clone(),
            local_priv_key: self.local_priv_key.clone(),
            local_peer_id: self.local_peer_id.clone(),
            remote_pub_key: self.remote_pub_key.clone(),
            remote_peer_id: self.remote_peer_id.clone(),
        }
    }
}

impl<C: SplitEx> fmt::Debug for Mplex<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Mplex")
            .field("id", &self.id)
            .field("ra", &self.ra)
            .field("rid", &self.remote_peer_id)
            .finish()
    }
}

impl<C: ConnectionInfo + SecureInfo + SplittableReadWrite> Mplex<C> {
    /// Creates a new mplex connection over an already secured socket.
    pub fn new(io: C, mode: Mode) -> Self {
        // `io` is moved into the connection, make a copy of its infos
        let local_priv_key = io.local_priv_key();
        let local_peer_id = io.local_peer();
        let remote_pub_key = io.remote_pub_key();
        let remote_peer_id = io.remote_peer();
        let la = io.local_multiaddr();
        let ra = io.remote_multiaddr();

        let connection = Connection::new(io, mode);
        let id = connection.id();
        let control = connection.control();
        Mplex {
            connection: Some(connection),
            control,
            id,
            la,
            ra,
            local_priv_key,
            local_peer_id,
            remote_pub_key,
            remote_peer_id,
        }
    }
}

impl<C: SplitEx> SecureInfo for Mplex<C> {
    fn local_peer(&self) -> PeerId {
        self.local_peer_id.clone()
    }

    fn remote_peer(&self) -> PeerId {
        self.remote_peer_id.clone()
    }

    fn local_priv_key(&self) -> Keypair {
        self.local_priv_key.clone()
    }

    fn remote_pub_key(&self) -> PublicKey {
        self.remote_pub_key.clone()
    }
}

impl<C: SplitEx> ConnectionInfo for Mplex<C> {
    fn local_multiaddr(&self) -> Multiaddr {
        self.la.clone()
    }

    fn remote_multiaddr(&self) -> Multiaddr {
        self.ra.clone()
    }
}

impl StreamInfo for Stream {
    fn id(&self) -> usize {
        Stream::id(self) as usize
    }
}

#[async_trait]
impl ReadWriteEx for Stream {
    fn box_clone(&self) -> IReadWrite {
        Box::new(self.clone())
    }
}

impl<C: SplittableReadWrite> StreamMuxerEx for Mplex<C> {}

#[async_trait]
impl<C: SplittableReadWrite> StreamMuxer for Mplex<C> {
    async fn open_stream(&mut self) -> Result<IReadWrite, TransportError> {
        let s = self.control.open_stream().await?;
        trace!("a new outbound substream {:?} opened for mplex...", s);
        Ok(Box::new(s))
    }

    async fn accept_stream(&mut self) -> Result<IReadWrite, TransportError> {
        let s = self.control.accept_stream().await?;
        trace!("a new inbound substream {:?} accepted for mplex...", s);
        Ok(Box::new(s))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.control.close().await?;
        Ok(())
    }

    fn task(&mut self) -> Option<BoxFuture<'static, ()>> {
        if let Some(conn) = self.connection.take() {
            let id = conn.id();
            return Some(
                async move {
                    let _ = conn.run().await;
                    info!("{} background-task exiting...", id);
                }
                .boxed(),
            );
        }
        None
    }

    fn box_clone(&self) -> IStreamMuxer {
        Box::new(self.clone())
    }
}

impl UpgradeInfo for Config {
    type Info = &'static [u8];

    fn protocol_info(&self) -> Vec<Self::Info> {
        vec![b"/mplex/6.7.0"]
    }
}

#[async_trait]
impl<T> Upgrader<T> for Config
where
    T: ConnectionInfo + SecureInfo + SplittableReadWrite,
{
    type Output = Mplex<T>;

    async fn upgrade_inbound(
        self,
        socket: T,
        _info: <Self as UpgradeInfo>::Info,
    ) -> Result<Self::Output, TransportError> {
        trace!("upgrading mplex inbound");
        Ok(Mplex::new(socket, Mode::Server))
    }

    async fn upgrade_outbound(
        self,
        socket: T,
        _info: <Self as UpgradeInfo>::Info,
    ) -> Result<Self::Output, TransportError> {
        trace!("upgrading mplex outbound");
        Ok(Mplex::new(socket, Mode::Client))
    }
}

impl From<ConnectionError> for TransportError {
    fn from(e: ConnectionError) -> Self {
        TransportError::StreamMuxer(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::connection::{Connection, Mode};
    use super::*;
    use async_std::task;
    use meshlink_core::transport::memory::Channel;
    use meshlink_traits::{ReadEx, WriteEx};

    fn connected_pair() -> (Control, Control) {
        let (a, b) = Channel::pair();
        let client = Connection::new(a, Mode::Client);
        let server = Connection::new(b, Mode::Server);
        let client_ctrl = client.control();
        let server_ctrl = server.control();
        task::spawn(async move {
            let _ = client.run().await;
        });
        task::spawn(async move {
            let _ = server.run().await;
        });
        (client_ctrl, server_ctrl)
    }

    #[test]
    fn open_accept_and_echo() {
        let (mut client, mut server) = connected_pair();

        let echo = task::spawn(async move {
            let stream = server.accept_stream().await.unwrap();
            let r = stream.clone();
            let w = stream.clone();
            let _ = meshlink_traits::copy(r, w).await;
        });

        task::block_on(async move {
            let mut stream = client.open_stream().await.unwrap();
            assert_eq!(stream.id(), 1); // dialer streams are odd

            let data = b"hello world";
            stream.write_all2(data).await.unwrap();
            let mut frame = vec![0; data.len()];
            stream.read_exact2(&mut frame).await.unwrap();
            assert_eq!(&frame[..], data);

            stream.close2().await.unwrap();
            client.close().await.unwrap();
            echo.await;
        });
    }

    #[test]
    fn many_concurrent_streams() {
        let (mut client, mut server) = connected_pair();

        let echo_all = task::spawn(async move {
            while let Ok(stream) = server.accept_stream().await {
                task::spawn(async move {
                    let r = stream.clone();
                    let w = stream.clone();
                    let _ = meshlink_traits::copy(r, w).await;
                });
            }
        });

        task::block_on(async move {
            let mut handles = Vec::new();
            for i in 0..10u8 {
                let mut stream = client.open_stream().await.unwrap();
                handles.push(task::spawn(async move {
                    let data = vec![i; 1000];
                    stream.write_all2(&data).await.unwrap();
                    let mut frame = vec![0; data.len()];
                    stream.read_exact2(&mut frame).await.unwrap();
                    assert_eq!(frame, data);
                    stream.close2().await.unwrap();
                }));
            }
            for h in handles {
                h.await;
            }
            client.close().await.unwrap();
            echo_all.await;
        });
    }

    #[test]
    fn close_then_write_fails_locally() {
        let (mut client, mut server) = connected_pair();

        let peer = task::spawn(async move {
            let mut stream = server.accept_stream().await.unwrap();
            // drain what arrives until eof, counting the bytes
            let mut total = 0usize;
            let mut buf = [0u8; 256];
            loop {
                match stream.read2(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => total += n,
                }
            }
            total
        });

        task::block_on(async move {
            let mut stream = client.open_stream().await.unwrap();
            stream.write_all2(b"one").await.unwrap();
            stream.write_all2(b"two").await.unwrap();
            stream.close2().await.unwrap();

            // the third message fails locally and never reaches the wire
            let err = stream.write2(b"three").await.unwrap_err();
            assert_eq!(err.kind(), std::io::ErrorKind::WriteZero);

            assert_eq!(peer.await, 6);
            client.close().await.unwrap();
        });
    }

    #[test]
    fn peer_may_send_after_our_close() {
        let (mut client, mut server) = connected_pair();

        let peer = task::spawn(async move {
            let mut stream = server.accept_stream().await.unwrap();
            // remote closed its write half; ours is still usable
            let mut buf = [0u8; 4];
            assert_eq!(stream.read2(&mut buf).await.unwrap(), 4);
            stream.write_all2(b"pong").await.unwrap();
            stream.close2().await.unwrap();
        });

        task::block_on(async move {
            let mut stream = client.open_stream().await.unwrap();
            stream.write_all2(b"ping").await.unwrap();
            stream.close2().await.unwrap();

            let mut buf = [0u8; 4];
            stream.read_exact2(&mut buf).await.unwrap();
            assert_eq!(&buf, b"pong");
            assert_eq!(stream.read2(&mut buf).await.unwrap(), 0);

            peer.await;
            client.close().await.unwrap();
        });
    }

    #[test]
    fn reset_kills_both_halves() {
        let (mut client, mut server) = connected_pair();

        let peer = task::spawn(async move {
            let mut stream = server.accept_stream().await.unwrap();
            let mut buf = [0u8; 16];
            // eventually the reset surfaces as an error
            loop {
                match stream.read2(&mut buf).await {
                    Ok(0) => panic!("expected reset, got eof"),
                    Ok(_) => continue,
                    Err(e) => {
                        assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset);
                        break;
                    }
                }
            }
        });

        task::block_on(async move {
            let mut stream = client.open_stream().await.unwrap();
            stream.write_all2(b"doomed").await.unwrap();
            stream.reset().await.unwrap();

            let err = stream.write2(b"more").await.unwrap_err();
            assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset);

            peer.await;
            client.close().await.unwrap();
        });
    }

    #[test]
    fn connection_close_resets_streams() {
        let (mut client, mut server) = connected_pair();

        task::block_on(async move {
            let mut stream = client.open_stream().await.unwrap();
            let accepted = server.accept_stream().await.unwrap();

            client.close().await.unwrap();

            // our handle fails on the closed connection
            assert!(stream.write2(b"x").await.is_err());
            // and the peer's handle dies with the remote connection
            let mut accepted = accepted;
            let mut buf = [0u8; 4];
            loop {
                match accepted.read2(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        });
    }
}
