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

use std::io;

use crate::connection::Id;
use crate::frame::header;
use crate::frame::length_delimited::LengthDelimited;
use crate::frame::Frame;
use meshlink_traits::{ReadEx, WriteEx};

pub(crate) const MAX_MESSAGE_SIZE: u32 = 1 << 20;

pub(crate) struct IO<T> {
    id: Id,
    io: LengthDelimited<T>,
}

impl<T> IO<T>
where
    T: Unpin + Send,
{
    pub(crate) fn new(id: Id, io: T) -> Self {
        IO {
            id,
            io: LengthDelimited::new(io),
        }
    }
}

impl<T> IO<T>
where
    T: ReadEx + Unpin,
{
    pub(crate) async fn recv_frame(&mut self) -> Result<Frame, FrameDecodeError> {
        // get header
        let header_byte = self.io.read_uvarint().await?;
        let header = header::decode(header_byte)?;

        log::trace!("{}: read stream header: {}", self.id, header);

        // get length
        let len = self.io.read_uvarint().await?;
        if len > u64::from(MAX_MESSAGE_SIZE) {
            return Err(FrameDecodeError::FrameTooLarge(len as usize));
        }
        if len == 0 {
            return Ok(Frame {
                header,
                body: Vec::new(),
            });
        }

        // get body
        let mut body = vec![0; len as usize];
        self.io.read_body(&mut body).await?;
        Ok(Frame { header, body })
    }
}

impl<T> IO<T>
where
    T: WriteEx + Unpin,
{
    pub(crate) async fn send_frame(&mut self, frame: &Frame) -> io::Result<()> {
        log::trace!(
            "{}: write stream, header: {}, len {}",
            self.id,
            frame.header,
            frame.body.len()
        );

        let hdr = header::encode(&frame.header);

        self.io.write_header(hdr).await?;
        self.io.write_length(frame.body.len() as u32).await?;
        if !frame.body.is_empty() {
            self.io.write_body(&frame.body).await?;
        }
        self.io.flush().await
    }

    pub(crate) async fn close(&mut self) -> io::Result<()> {
        self.io.close().await
    }
}

/// Possible errors while decoding a message frame.
#[non_exhaustive]
#[derive(Debug)]
pub enum FrameDecodeError {
    /// An I/O error.
    Io(io::Error),
    /// Decoding the frame header failed.
    Header(header::HeaderDecodeError),
    /// A data frame body length is larger than the configured maximum.
    FrameTooLarge(usize),
}

impl std::fmt::Display for FrameDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameDecodeError::Io(e) => write!(f, "i/o error: {}", e),
            FrameDecodeError::Header(e) => write!(f, "decode error: {}", e),
            FrameDecodeError::FrameTooLarge(n) => write!(f, "frame body is too large ({})", n),
        }
    }
}

impl std::error::Error for FrameDecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameDecodeError::Io(e) => Some(e),
            FrameDecodeError::Header(e) => Some(e),
            FrameDecodeError::FrameTooLarge(_) => None,
        }
    }
}

impl From<std::io::Error> for FrameDecodeError {
    fn from(e: std::io::Error) -> Self {
        FrameDecodeError::Io(e)
    }
}

impl From<header::HeaderDecodeError> for FrameDecodeError {
    fn from(e: header::HeaderDecodeError) -> Self {
        FrameDecodeError::Header(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::header::Tag;
    use async_std::task;
    use meshlink_core::transport::memory::Channel;
    use meshlink_traits::{ReadEx, SplitEx, WriteEx};

    fn io_pair() -> (IO<Channel>, Channel) {
        let (a, b) = Channel::pair();
        (IO::new(Id::new(1), a), b)
    }

    #[test]
    fn frame_round_trip() {
        task::block_on(async {
            let (a, b) = Channel::pair();
            let mut w = IO::new(Id::new(1), a);
            let mut r = IO::new(Id::new(2), b);

            for frame in vec![
                Frame::new_stream(0, Vec::new()),
                Frame::new_stream(1, Vec::new()),
                Frame::message(1, true, b"hello".to_vec()),
                Frame::message(127, false, vec![0u8; 1000]),
                Frame::message(128, true, Vec::new()),
                Frame::message(1 << 53, true, b"far out".to_vec()),
                Frame::close(7, false),
                Frame::reset(9, true),
            ] {
                w.send_frame(&frame).await.unwrap();
                assert_eq!(r.recv_frame().await.unwrap(), frame);
            }
        });
    }

    #[test]
    fn known_byte_vectors() {
        task::block_on(async {
            // {streamId=1, NewStream, data=""} is 08 00
            let (mut io, raw) = io_pair();
            io.send_frame(&Frame::new_stream(1, Vec::new())).await.unwrap();
            drop(io);
            let (mut raw_r, _w) = raw.split();
            let mut buf = [0u8; 2];
            raw_r.read_exact2(&mut buf).await.unwrap();
            assert_eq!(buf, [0x08, 0x00]);

            // {streamId=2, MessageInitiator, data="hello"} is 12 05 "hello"
            let (mut io, raw) = io_pair();
            io.send_frame(&Frame::message(2, true, b"hello".to_vec())).await.unwrap();
            drop(io);
            let (mut raw_r, _w) = raw.split();
            let mut buf = [0u8; 7];
            raw_r.read_exact2(&mut buf).await.unwrap();
            assert_eq!(&buf[..2], &[0x12, 0x05]);
            assert_eq!(&buf[2..], b"hello");
        });
    }

    #[test]
    fn receiver_tag_decodes_as_locally_initiated() {
        task::block_on(async {
            // 11 05 "hello": streamId=2, MessageReceiver, i.e. our own stream
            let (a, b) = Channel::pair();
            let (_r, mut w) = a.split();
            w.write_all2(&[0x11, 0x05]).await.unwrap();
            w.write_all2(b"hello").await.unwrap();

            let mut io = IO::new(Id::new(1), b);
            let frame = io.recv_frame().await.unwrap();
            assert_eq!(frame.header.stream_id, 2);
            assert_eq!(frame.header.tag, Tag::MessageReceiver);
            assert!(frame.header.is_local_initiator());
            assert_eq!(frame.body, b"hello");
        });
    }

    #[test]
    fn oversize_frame_is_rejected() {
        task::block_on(async {
            let (a, b) = Channel::pair();
            let (_r, mut w) = a.split();
            // header 08, length = 2 MiB
            w.write_all2(&[0x08]).await.unwrap();
            let mut len = Vec::new();
            meshlink_core::varint::encode((2 * 1024 * 1024) as u64, &mut len);
            w.write_all2(&len).await.unwrap();

            let mut io = IO::new(Id::new(1), b);
            assert!(matches!(
                io.recv_frame().await,
                Err(FrameDecodeError::FrameTooLarge(_))
            ));
        });
    }
}
