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

//! Noise protocol I/O after the handshake.

use crate::framed::{read_frame_bytes, write_frame_bytes, MAX_PAYLOAD_LEN, TAG_LEN};

use async_trait::async_trait;
use bytes::Bytes;
use log::trace;
use meshlink_core::identity::Keypair;
use meshlink_core::secure_io::SecureInfo;
use meshlink_core::transport::ConnectionInfo;
use meshlink_core::{Multiaddr, PeerId, PublicKey};
use meshlink_traits::{ReadEx, SplitEx, SplittableReadWrite, WriteEx};
use snow::StatelessTransportState;
use std::sync::Arc;
use std::{cmp::min, fmt, io};

/// A noise session to a remote.
///
/// `T` is the type of the underlying I/O resource.
pub struct NoiseOutput<T: SplitEx> {
    reader: NoiseReader<T::Reader>,
    writer: NoiseWriter<T::Writer>,
    la: Multiaddr,
    ra: Multiaddr,
    local_priv_key: Keypair,
    remote_pub_key: PublicKey,
}

impl<T: SplitEx> fmt::Debug for NoiseOutput<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseOutput").field("remote", &self.remote_pub_key).finish()
    }
}

impl<T: SplitEx> NoiseOutput<T> {
    pub(crate) fn new(
        io: T,
        state: Arc<StatelessTransportState>,
        la: Multiaddr,
        ra: Multiaddr,
        local_priv_key: Keypair,
        remote_pub_key: PublicKey,
    ) -> Self {
        let (r, w) = io.split();
        NoiseOutput {
            reader: NoiseReader {
                io: r,
                state: state.clone(),
                nonce: 0,
                recv_buffer: Bytes::new(),
                recv_offset: 0,
            },
            writer: NoiseWriter {
                io: w,
                state,
                nonce: 0,
            },
            la,
            ra,
            local_priv_key,
            remote_pub_key,
        }
    }
}

impl<T: SplitEx> ConnectionInfo for NoiseOutput<T> {
    fn local_multiaddr(&self) -> Multiaddr {
        self.la.clone()
    }

    fn remote_multiaddr(&self) -> Multiaddr {
        self.ra.clone()
    }
}

impl<T: SplitEx> SecureInfo for NoiseOutput<T> {
    fn local_peer(&self) -> PeerId {
        self.local_priv_key.public().into_peer_id()
    }

    fn remote_peer(&self) -> PeerId {
        self.remote_pub_key.clone().into_peer_id()
    }

    fn local_priv_key(&self) -> Keypair {
        self.local_priv_key.clone()
    }

    fn remote_pub_key(&self) -> PublicKey {
        self.remote_pub_key.clone()
    }
}

#[async_trait]
impl<T: SplittableReadWrite> ReadEx for NoiseOutput<T> {
    async fn read2(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read2(buf).await
    }
}

#[async_trait]
impl<T: SplittableReadWrite> WriteEx for NoiseOutput<T> {
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

impl<T: SplittableReadWrite> SplitEx for NoiseOutput<T> {
    type Reader = NoiseReader<T::Reader>;
    type Writer = NoiseWriter<T::Writer>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (self.reader, self.writer)
    }
}

/// Decrypting read half of a Noise session.
///
/// Frames larger than the caller's buffer are kept and drained by the
/// following reads.
pub struct NoiseReader<R> {
    io: R,
    state: Arc<StatelessTransportState>,
    nonce: u64,
    recv_buffer: Bytes,
    recv_offset: usize,
}

#[async_trait]
impl<R: ReadEx + Unpin + 'static> ReadEx for NoiseReader<R> {
    async fn read2(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let len = self.recv_buffer.len();
            let off = self.recv_offset;
            if len > 0 {
                let n = min(len - off, buf.len());
                buf[..n].copy_from_slice(&self.recv_buffer[off..off + n]);
                trace!("read: copied {}/{} bytes", off + n, len);
                self.recv_offset += n;
                if len == self.recv_offset {
                    trace!("read: frame consumed");
                    self.recv_buffer = Bytes::new();
                    self.recv_offset = 0;
                }
                return Ok(n);
            }

            let frame = match read_frame_bytes(&mut self.io).await {
                Ok(frame) => frame,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(0),
                Err(e) => return Err(e),
            };
            let mut out = vec![0u8; frame.len()];
            let n = self
                .state
                .read_message(self.nonce, &frame, &mut out)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            self.nonce += 1;
            out.truncate(n);
            self.recv_buffer = Bytes::from(out);
            self.recv_offset = 0;
        }
    }
}

/// Encrypting write half of a Noise session.
pub struct NoiseWriter<W> {
    io: W,
    state: Arc<StatelessTransportState>,
    nonce: u64,
}

#[async_trait]
impl<W: WriteEx + Unpin + 'static> WriteEx for NoiseWriter<W> {
    async fn write2(&mut self, buf: &[u8]) -> io::Result<usize> {
        // a single write never exceeds one Noise message
        let chunk = &buf[..min(buf.len(), MAX_PAYLOAD_LEN)];
        let mut out = vec![0u8; chunk.len() + TAG_LEN];
        let n = self
            .state
            .write_message(self.nonce, chunk, &mut out)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.nonce += 1;
        write_frame_bytes(&mut self.io, &out[..n]).await?;
        Ok(chunk.len())
    }

    async fn flush2(&mut self) -> io::Result<()> {
        self.io.flush2().await
    }

    async fn close2(&mut self) -> io::Result<()> {
        self.io.close2().await
    }
}
