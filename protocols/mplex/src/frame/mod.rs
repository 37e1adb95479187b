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

pub mod header;
pub(crate) mod io;
mod length_delimited;

use header::{Header, Tag};

/// An mplex frame: header plus opaque body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub body: Vec<u8>,
}

impl Frame {
    /// A `NewStream` frame; the body optionally names the stream.
    pub fn new_stream(stream_id: u64, name: Vec<u8>) -> Self {
        Frame {
            header: Header {
                stream_id,
                tag: Tag::NewStream,
            },
            body: name,
        }
    }

    /// A data frame; `initiator` is the sender's role on that stream.
    pub fn message(stream_id: u64, initiator: bool, body: Vec<u8>) -> Self {
        Frame {
            header: Header {
                stream_id,
                tag: if initiator {
                    Tag::MessageInitiator
                } else {
                    Tag::MessageReceiver
                },
            },
            body,
        }
    }

    /// A half-close frame; `initiator` is the sender's role on that stream.
    pub fn close(stream_id: u64, initiator: bool) -> Self {
        Frame {
            header: Header {
                stream_id,
                tag: if initiator {
                    Tag::CloseInitiator
                } else {
                    Tag::CloseReceiver
                },
            },
            body: Vec::new(),
        }
    }

    /// A reset frame; `initiator` is the sender's role on that stream.
    pub fn reset(stream_id: u64, initiator: bool) -> Self {
        Frame {
            header: Header {
                stream_id,
                tag: if initiator {
                    Tag::ResetInitiator
                } else {
                    Tag::ResetReceiver
                },
            },
            body: Vec::new(),
        }
    }
}
