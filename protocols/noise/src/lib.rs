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

//! The Noise-XX secure channel.
//!
//! Three handshake messages authenticate both ends via identity-key
//! signatures over their static Noise keys; afterwards the split cipher
//! states encrypt every frame in both directions.

mod error;
mod framed;
mod handshake;
mod io;
mod payload_proto;

pub use crate::error::NoiseError;
pub use crate::io::{NoiseOutput, NoiseReader, NoiseWriter};

use async_trait::async_trait;
use meshlink_core::identity::Keypair;
use meshlink_core::transport::{ConnectionInfo, TransportError};
use meshlink_core::upgrade::{UpgradeInfo, Upgrader};
use meshlink_traits::SplittableReadWrite;

/// Config for a Noise upgrade.
#[derive(Clone)]
pub struct NoiseConfig {
    key: Keypair,
}

impl NoiseConfig {
    /// Creates a config using the given identity keypair.
    pub fn new(key: Keypair) -> Self {
        NoiseConfig { key }
    }

    /// Runs the handshake, `initiator` designating the dialing side.
    pub async fn handshake<T>(
        self,
        socket: T,
        initiator: bool,
    ) -> Result<NoiseOutput<T>, NoiseError>
    where
        T: ConnectionInfo + SplittableReadWrite,
    {
        let la = socket.local_multiaddr();
        let ra = socket.remote_multiaddr();
        let (io, state, remote_identity) =
            handshake::handshake(socket, self.key.clone(), initiator).await?;
        Ok(NoiseOutput::new(io, state, la, ra, self.key, remote_identity))
    }
}

impl UpgradeInfo for NoiseConfig {
    type Info = &'static [u8];

    fn protocol_info(&self) -> Vec<Self::Info> {
        vec![b"/noise/Noise_XX_25519_ChaChaPoly_SHA256/0.1.0"]
    }
}

#[async_trait]
impl<T> Upgrader<T> for NoiseConfig
where
    T: ConnectionInfo + SplittableReadWrite,
{
    type Output = NoiseOutput<T>;

    async fn upgrade_inbound(
        self,
        socket: T,
        _info: <Self as UpgradeInfo>::Info,
    ) -> Result<Self::Output, TransportError> {
        self.handshake(socket, false).await.map_err(Into::into)
    }

    async fn upgrade_outbound(
        self,
        socket: T,
        _info: <Self as UpgradeInfo>::Info,
    ) -> Result<Self::Output, TransportError> {
        self.handshake(socket, true).await.map_err(Into::into)
    }
}

impl From<NoiseError> for TransportError {
    fn from(e: NoiseError) -> Self {
        TransportError::Security(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_std::task;
    use meshlink_core::secure_io::SecureInfo;
    use meshlink_core::transport::memory::Channel;
    use meshlink_traits::{ReadEx, WriteEx};

    #[test]
    fn xx_handshake_and_data() {
        let key_a = Keypair::generate_ed25519();
        let key_b = Keypair::generate_ed25519();
        let id_a = key_a.public().into_peer_id();
        let id_b = key_b.public().into_peer_id();

        let (a, b) = Channel::pair();

        let responder = task::spawn(async move {
            let mut out = NoiseConfig::new(key_b).handshake(a, false).await.unwrap();
            let mut buf = [0u8; 5];
            out.read_exact2(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hello");
            out.write_all2(b"world").await.unwrap();
            out.remote_peer()
        });

        task::block_on(async move {
            let mut out = NoiseConfig::new(key_a).handshake(b, true).await.unwrap();
            assert_eq!(out.remote_peer(), id_b);
            out.write_all2(b"hello").await.unwrap();
            let mut buf = [0u8; 5];
            out.read_exact2(&mut buf).await.unwrap();
            assert_eq!(&buf, b"world");
            assert_eq!(responder.await, id_a);
        });
    }

    #[test]
    fn large_writes_are_chunked() {
        let key_a = Keypair::generate_ed25519();
        let key_b = Keypair::generate_ed25519();
        let (a, b) = Channel::pair();

        let data = vec![0x5au8; 256 * 1024];
        let expected = data.clone();

        let responder = task::spawn(async move {
            let mut out = NoiseConfig::new(key_b).handshake(a, false).await.unwrap();
            let mut buf = vec![0u8; 256 * 1024];
            out.read_exact2(&mut buf).await.unwrap();
            buf
        });

        task::block_on(async move {
            let mut out = NoiseConfig::new(key_a).handshake(b, true).await.unwrap();
            out.write_all2(&data).await.unwrap();
            assert_eq!(responder.await, expected);
        });
    }

    #[test]
    fn tampered_transport_frame_is_rejected() {
        use meshlink_traits::SplitEx;

        let key_a = Keypair::generate_ed25519();
        let key_b = Keypair::generate_ed25519();
        let (a, b) = Channel::pair();
        let (c, d) = Channel::pair();

        // forward handshake untouched, then flip a bit in the first data frame
        let (mut b_r, mut b_w) = b.split();
        let (mut c_r, mut c_w) = c.split();
        let forward = task::spawn(async move {
            let mut frames = 0usize;
            loop {
                let mut frame = match crate::framed::read_frame_bytes(&mut b_r).await {
                    Ok(f) => f,
                    Err(_) => break,
                };
                if frames >= 2 {
                    // past the two initiator handshake messages
                    let last = frame.len() - 1;
                    frame[last] ^= 0x01;
                }
                frames += 1;
                if crate::framed::write_frame_bytes(&mut c_w, &frame).await.is_err() {
                    break;
                }
            }
        });
        let backward = task::spawn(async move {
            loop {
                let frame = match crate::framed::read_frame_bytes(&mut c_r).await {
                    Ok(f) => f,
                    Err(_) => break,
                };
                if crate::framed::write_frame_bytes(&mut b_w, &frame).await.is_err() {
                    break;
                }
            }
        });

        let responder = task::spawn(async move {
            let mut out = NoiseConfig::new(key_b).handshake(d, false).await.unwrap();
            let mut buf = [0u8; 5];
            out.read_exact2(&mut buf).await
        });

        task::block_on(async move {
            let mut out = NoiseConfig::new(key_a).handshake(a, true).await.unwrap();
            out.write_all2(b"hello").await.unwrap();
            assert!(responder.await.is_err());
            drop(out);
            forward.await;
            backward.await;
        });
    }
}
