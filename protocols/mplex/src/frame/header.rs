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

//! The mplex frame header: a varint carrying `(stream_id << 3) | tag`.

use std::fmt;

/// The tag nibble naming the frame kind; `Receiver`/`Initiator` name the
/// role of the *sender* of the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    NewStream = 0,
    MessageReceiver = 1,
    MessageInitiator = 2,
    CloseReceiver = 3,
    CloseInitiator = 4,
    ResetReceiver = 5,
    ResetInitiator = 6,
}

/// The decoded header of an mplex frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub stream_id: u64,
    pub tag: Tag,
}

impl Header {
    /// Whether, seen from the receiving end, the frame belongs to a stream
    /// the receiver initiated. The tag names the sender's role, so it is
    /// inverted here; a `NewStream` is by definition initiated by the sender.
    pub fn is_local_initiator(&self) -> bool {
        match self.tag {
            Tag::NewStream => false,
            Tag::MessageReceiver | Tag::CloseReceiver | Tag::ResetReceiver => true,
            Tag::MessageInitiator | Tag::CloseInitiator | Tag::ResetInitiator => false,
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(Header {:?} {})", self.tag, self.stream_id)
    }
}

/// Encodes a header into its wire varint value.
pub fn encode(header: &Header) -> u64 {
    (header.stream_id << 3) | header.tag as u64
}

/// Decodes a header from its wire varint value.
pub fn decode(header_byte: u64) -> Result<Header, HeaderDecodeError> {
    let stream_id = header_byte >> 3;
    let tag = match header_byte & 0x07 {
        0 => Tag::NewStream,
        1 => Tag::MessageReceiver,
        2 => Tag::MessageInitiator,
        3 => Tag::CloseReceiver,
        4 => Tag::CloseInitiator,
        5 => Tag::ResetReceiver,
        6 => Tag::ResetInitiator,
        t => return Err(HeaderDecodeError::Tag(t as u8)),
    };
    Ok(Header { stream_id, tag })
}

/// Possible errors while decoding a frame header.
#[non_exhaustive]
#[derive(Debug)]
pub enum HeaderDecodeError {
    /// Unknown tag nibble.
    Tag(u8),
}

impl fmt::Display for HeaderDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HeaderDecodeError::Tag(t) => write!(f, "unknown frame tag: {}", t),
        }
    }
}

impl std::error::Error for HeaderDecodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        for &tag in &[
            Tag::NewStream,
            Tag::MessageReceiver,
            Tag::MessageInitiator,
            Tag::CloseReceiver,
            Tag::CloseInitiator,
            Tag::ResetReceiver,
            Tag::ResetInitiator,
        ] {
            for &stream_id in &[0u64, 1, 127, 128, 1 << 53] {
                let header = Header { stream_id, tag };
                assert_eq!(decode(encode(&header)).unwrap(), header);
            }
        }
    }

    #[test]
    fn reserved_tag_is_rejected() {
        assert!(decode(7).is_err());
    }

    #[test]
    fn sender_role_is_inverted_at_the_receiver() {
        let h = |tag| Header { stream_id: 9, tag };
        assert!(!h(Tag::NewStream).is_local_initiator());
        assert!(h(Tag::MessageReceiver).is_local_initiator());
        assert!(!h(Tag::MessageInitiator).is_local_initiator());
        assert!(h(Tag::CloseReceiver).is_local_initiator());
        assert!(!h(Tag::CloseInitiator).is_local_initiator());
        assert!(h(Tag::ResetReceiver).is_local_initiator());
        assert!(!h(Tag::ResetInitiator).is_local_initiator());
    }
}
