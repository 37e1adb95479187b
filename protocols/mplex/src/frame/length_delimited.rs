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

//! Varint/byte-level I/O for the mplex framing.

use meshlink_core::varint;
use meshlink_traits::{ReadEx, WriteEx};
use std::io;

/// Wraps one half of the connection socket with the primitive reads and
/// writes mplex frames are made of.
pub(crate) struct LengthDelimited<T> {
    io: T,
}

impl<T> LengthDelimited<T> {
    pub(crate) fn new(io: T) -> Self {
        LengthDelimited { io }
    }
}

impl<T: ReadEx + Unpin> LengthDelimited<T> {
    /// Reads one unsigned varint, e.g. a header or a body length.
    pub(crate) async fn read_uvarint(&mut self) -> io::Result<u64> {
        varint::read_u64(&mut self.io).await
    }

    /// Reads an exact frame body.
    pub(crate) async fn read_body(&mut self, body: &mut [u8]) -> io::Result<()> {
        self.io.read_exact2(body).await
    }
}

impl<T: WriteEx + Unpin> LengthDelimited<T> {
    pub(crate) async fn write_header(&mut self, header: u64) -> io::Result<()> {
        varint::write_u64(&mut self.io, header).await
    }

    pub(crate) async fn write_length(&mut self, len: u32) -> io::Result<()> {
        varint::write_u64(&mut self.io, u64::from(len)).await
    }

    pub(crate) async fn write_body(&mut self, body: &[u8]) -> io::Result<()> {
        self.io.write_all2(body).await
    }

    pub(crate) async fn flush(&mut self) -> io::Result<()> {
        self.io.flush2().await
    }

    pub(crate) async fn close(&mut self) -> io::Result<()> {
        self.io.close2().await
    }
}
