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

//! Async read/write traits used by every layer of the meshlink stack.
//!
//! These traits play the role `AsyncRead`/`AsyncWrite` play elsewhere, but
//! as `async_trait` methods so that protocol upgrades, secure channels and
//! stream muxers can implement them with plain `async fn` bodies instead of
//! hand-written `poll_*` state machines.

use async_trait::async_trait;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use std::io;

/// The read half of a duplex byte pipe.
#[async_trait]
pub trait ReadEx: Send {
    /// Reads some bytes into `buf`, returning how many were read.
    ///
    /// A return value of `Ok(0)` signals end of stream.
    async fn read2(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Reads exactly `buf.len()` bytes, failing with `UnexpectedEof` if the
    /// stream ends first.
    async fn read_exact2(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read2(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            filled += n;
        }
        Ok(())
    }

    /// Reads one frame prefixed by a 4-byte big-endian length.
    ///
    /// Fails with `InvalidData` if the length exceeds `max_frame_len`.
    async fn read_one_fixed(&mut self, max_frame_len: usize) -> io::Result<Vec<u8>> {
        let mut len = [0u8; 4];
        self.read_exact2(&mut len).await?;
        let n = u32::from_be_bytes(len) as usize;
        if n > max_frame_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {} bytes exceeds maximum of {}", n, max_frame_len),
            ));
        }
        let mut frame = vec![0u8; n];
        self.read_exact2(&mut frame).await?;
        Ok(frame)
    }
}

/// The write half of a duplex byte pipe.
#[async_trait]
pub trait WriteEx: Send {
    /// Writes some bytes from `buf`, returning how many were written.
    async fn write2(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Writes the whole of `buf`, failing with `WriteZero` if the stream
    /// refuses to make progress.
    async fn write_all2(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write2(&buf[written..]).await?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            written += n;
        }
        Ok(())
    }

    /// Writes one frame prefixed by a 4-byte big-endian length.
    async fn write_one_fixed(&mut self, buf: &[u8]) -> io::Result<()> {
        let len = (buf.len() as u32).to_be_bytes();
        self.write_all2(&len).await?;
        self.write_all2(buf).await
    }

    /// Flushes buffered data down to the underlying transport.
    async fn flush2(&mut self) -> io::Result<()>;

    /// Closes the write half. Further writes fail.
    async fn close2(&mut self) -> io::Result<()>;
}

/// A stream that can be split into independently owned halves.
///
/// Needed by layers that run a background read loop while writers are held
/// elsewhere, e.g. the mplex connection.
pub trait SplitEx {
    type Reader: ReadEx + Unpin + 'static;
    type Writer: WriteEx + Unpin + 'static;

    fn split(self) -> (Self::Reader, Self::Writer);
}

/// Shorthand for a stream usable as a full-duplex upgrade target.
pub trait SplittableReadWrite: ReadEx + WriteEx + SplitEx + Unpin + Send + 'static {}

impl<T: ReadEx + WriteEx + SplitEx + Unpin + Send + 'static> SplittableReadWrite for T {}

#[async_trait]
impl<T: AsyncRead + Unpin + Send> ReadEx for T {
    async fn read2(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        AsyncReadExt::read(self, buf).await
    }
}

#[async_trait]
impl<T: AsyncWrite + Unpin + Send> WriteEx for T {
    async fn write2(&mut self, buf: &[u8]) -> io::Result<usize> {
        AsyncWriteExt::write(self, buf).await
    }

    async fn flush2(&mut self) -> io::Result<()> {
        AsyncWriteExt::flush(self).await
    }

    async fn close2(&mut self) -> io::Result<()> {
        AsyncWriteExt::close(self).await
    }
}

/// Copies everything from `reader` to `writer` until end of stream,
/// returning how many bytes moved.
pub async fn copy<R, W>(mut reader: R, mut writer: W) -> io::Result<u64>
where
    R: ReadEx + Unpin,
    W: WriteEx + Unpin,
{
    let mut buf = [0u8; 4096];
    let mut total = 0u64;
    loop {
        let n = reader.read2(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all2(&buf[..n]).await?;
        total += n as u64;
    }
    writer.flush2().await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    #[test]
    fn read_exact_and_one_fixed() {
        async_std::task::block_on(async {
            let mut data = vec![0, 0, 0, 5];
            data.extend_from_slice(b"hello");
            let mut io = Cursor::new(data);
            let frame = io.read_one_fixed(1024).await.unwrap();
            assert_eq!(frame, b"hello");
        });
    }

    #[test]
    fn one_fixed_rejects_oversize() {
        async_std::task::block_on(async {
            let mut io = Cursor::new(vec![0xff, 0xff, 0xff, 0xff]);
            assert!(io.read_one_fixed(1024).await.is_err());
        });
    }

    #[test]
    fn write_one_fixed_round_trip() {
        async_std::task::block_on(async {
            let mut io = Cursor::new(Vec::new());
            io.write_one_fixed(b"ping").await.unwrap();
            let buf = io.into_inner();
            assert_eq!(&buf[..4], &[0, 0, 0, 4]);
            assert_eq!(&buf[4..], b"ping");
        });
    }
}
