use crate::{Error, Result};
use arrayref::array_ref;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use multihash::Multihash;
use std::{
    borrow::Cow,
    convert::From,
    fmt,
    io::Write,
    net::{Ipv4Addr, Ipv6Addr},
    str::{self, FromStr},
};
use unsigned_varint::{decode, encode};

pub const DNS: u32 = 53;
pub const DNS4: u32 = 54;
pub const DNS6: u32 = 55;
pub const DNSADDR: u32 = 56;
pub const IP4: u32 = 4;
pub const IP6: u32 = 41;
pub const MEMORY: u32 = 777;
pub const P2P: u32 = 421;
pub const TCP: u32 = 6;
pub const UDP: u32 = 273;
pub const UNIX: u32 = 400;
pub const WS: u32 = 477;
pub const WSS: u32 = 478;

/// `Protocol` describes all possible multiaddress protocols.
///
/// For `Unix` we use `&str` instead of `Path` to allow cross-platform usage
/// of `Protocol` since encoding `Paths` to bytes is platform-specific. This
/// means that the actual validation of paths needs to happen separately.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Protocol<'a> {
    Dns(Cow<'a, str>),
    Dns4(Cow<'a, str>),
    Dns6(Cow<'a, str>),
    Dnsaddr(Cow<'a, str>),
    Ip4(Ipv4Addr),
    Ip6(Ipv6Addr),
    /// Contains the "port" to contact. Similar to TCP or UDP, 0 means "assign me a port".
    Memory(u64),
    P2p(Multihash),
    Tcp(u16),
    Udp(u16),
    Unix(Cow<'a, str>),
    Ws,
    Wss,
}

impl<'a> Protocol<'a> {
    /// Parse a protocol value from the given iterator of string slices.
    ///
    /// The parsing only consumes the minimum amount of string slices necessary
    /// to produce a well-formed protocol. The same iterator can thus be used
    /// to parse a sequence of protocols in succession. It is up to client code
    /// to check that iteration has finished whenever appropriate.
    ///
    /// A path protocol (`unix`) is terminal and absorbs every remaining
    /// segment of the iterator.
    pub fn from_str_parts<I>(mut iter: I) -> Result<Self>
    where
        I: Iterator<Item = &'a str>,
    {
        match iter.next().ok_or(Error::InvalidProtocolString)? {
            "ip4" => {
                let s = iter.next().ok_or(Error::InvalidProtocolString)?;
                Ok(Protocol::Ip4(Ipv4Addr::from_str(s)?))
            }
            "ip6" => {
                let s = iter.next().ok_or(Error::InvalidProtocolString)?;
                Ok(Protocol::Ip6(Ipv6Addr::from_str(s)?))
            }
            "tcp" => {
                let s = iter.next().ok_or(Error::InvalidProtocolString)?;
                Ok(Protocol::Tcp(s.parse()?))
            }
            "udp" => {
                let s = iter.next().ok_or(Error::InvalidProtocolString)?;
                Ok(Protocol::Udp(s.parse()?))
            }
            "dns" => {
                let s = iter.next().ok_or(Error::InvalidProtocolString)?;
                Ok(Protocol::Dns(Cow::Borrowed(s)))
            }
            "dns4" => {
                let s = iter.next().ok_or(Error::InvalidProtocolString)?;
                Ok(Protocol::Dns4(Cow::Borrowed(s)))
            }
            "dns6" => {
                let s = iter.next().ok_or(Error::InvalidProtocolString)?;
                Ok(Protocol::Dns6(Cow::Borrowed(s)))
            }
            "dnsaddr" => {
                let s = iter.next().ok_or(Error::InvalidProtocolString)?;
                Ok(Protocol::Dnsaddr(Cow::Borrowed(s)))
            }
            "p2p" | "ipfs" => {
                let s = iter.next().ok_or(Error::InvalidProtocolString)?;
                let decoded = bs58::decode(s).into_vec()?;
                Ok(Protocol::P2p(Multihash::from_bytes(decoded)?))
            }
            "unix" => {
                // a path protocol swallows the rest of the address string
                let tail = iter.collect::<Vec<_>>();
                if tail.is_empty() {
                    return Err(Error::InvalidProtocolString);
                }
                Ok(Protocol::Unix(Cow::Owned(tail.join("/"))))
            }
            "memory" => {
                let s = iter.next().ok_or(Error::InvalidProtocolString)?;
                Ok(Protocol::Memory(s.parse()?))
            }
            "ws" => Ok(Protocol::Ws),
            "wss" => Ok(Protocol::Wss),
            _ => Err(Error::UnknownProtocolString),
        }
    }

    /// Parse a single `Protocol` from its raw bytes, returning the protocol
    /// as well as the remaining byte slice.
    pub fn from_bytes(input: &'a [u8]) -> Result<(Self, &'a [u8])> {
        fn split_at(n: usize, input: &[u8]) -> Result<(&[u8], &[u8])> {
            if input.len() < n {
                return Err(Error::DataLessThanLen);
            }
            Ok(input.split_at(n))
        }
        let (id, input) = decode::u32(input)?;
        match id {
            DNS => {
                let (n, input) = decode::usize(input)?;
                let (data, rest) = split_at(n, input)?;
                Ok((Protocol::Dns(Cow::Borrowed(str::from_utf8(data)?)), rest))
            }
            DNS4 => {
                let (n, input) = decode::usize(input)?;
                let (data, rest) = split_at(n, input)?;
                Ok((Protocol::Dns4(Cow::Borrowed(str::from_utf8(data)?)), rest))
            }
            DNS6 => {
                let (n, input) = decode::usize(input)?;
                let (data, rest) = split_at(n, input)?;
                Ok((Protocol::Dns6(Cow::Borrowed(str::from_utf8(data)?)), rest))
            }
            DNSADDR => {
                let (n, input) = decode::usize(input)?;
                let (data, rest) = split_at(n, input)?;
                Ok((Protocol::Dnsaddr(Cow::Borrowed(str::from_utf8(data)?)), rest))
            }
            IP4 => {
                let (data, rest) = split_at(4, input)?;
                Ok((Protocol::Ip4(Ipv4Addr::from(*array_ref!(data, 0, 4))), rest))
            }
            IP6 => {
                let (data, rest) = split_at(16, input)?;
                let mut seg = [0u16; 8];
                for (i, s) in seg.iter_mut().enumerate() {
                    *s = BigEndian::read_u16(&data[2 * i..]);
                }
                Ok((
                    Protocol::Ip6(Ipv6Addr::new(
                        seg[0], seg[1], seg[2], seg[3], seg[4], seg[5], seg[6], seg[7],
                    )),
                    rest,
                ))
            }
            MEMORY => {
                let (data, rest) = split_at(8, input)?;
                Ok((Protocol::Memory(BigEndian::read_u64(data)), rest))
            }
            P2P => {
                let (n, input) = decode::usize(input)?;
                let (data, rest) = split_at(n, input)?;
                Ok((Protocol::P2p(Multihash::from_bytes(data.to_owned())?), rest))
            }
            TCP => {
                let (data, rest) = split_at(2, input)?;
                Ok((Protocol::Tcp(BigEndian::read_u16(data)), rest))
            }
            UDP => {
                let (data, rest) = split_at(2, input)?;
                Ok((Protocol::Udp(BigEndian::read_u16(data)), rest))
            }
            UNIX => {
                let (n, input) = decode::usize(input)?;
                let (data, rest) = split_at(n, input)?;
                Ok((Protocol::Unix(Cow::Borrowed(str::from_utf8(data)?)), rest))
            }
            WS => Ok((Protocol::Ws, input)),
            WSS => Ok((Protocol::Wss, input)),
            _ => Err(Error::UnknownProtocolId(id)),
        }
    }

    /// Encode this protocol by writing its binary representation into `w`.
    pub fn write_bytes<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut code_buf = encode::u32_buffer();
        let mut len_buf = encode::usize_buffer();
        match self {
            Protocol::Ip4(addr) => {
                w.write_all(encode::u32(IP4, &mut code_buf))?;
                w.write_all(&addr.octets())?
            }
            Protocol::Ip6(addr) => {
                w.write_all(encode::u32(IP6, &mut code_buf))?;
                for &segment in &addr.segments() {
                    w.write_u16::<BigEndian>(segment)?
                }
            }
            Protocol::Tcp(port) => {
                w.write_all(encode::u32(TCP, &mut code_buf))?;
                w.write_u16::<BigEndian>(*port)?
            }
            Protocol::Udp(port) => {
                w.write_all(encode::u32(UDP, &mut code_buf))?;
                w.write_u16::<BigEndian>(*port)?
            }
            Protocol::Dns(s) => {
                w.write_all(encode::u32(DNS, &mut code_buf))?;
                w.write_all(encode::usize(s.len(), &mut len_buf))?;
                w.write_all(s.as_bytes())?
            }
            Protocol::Dns4(s) => {
                w.write_all(encode::u32(DNS4, &mut code_buf))?;
                w.write_all(encode::usize(s.len(), &mut len_buf))?;
                w.write_all(s.as_bytes())?
            }
            Protocol::Dns6(s) => {
                w.write_all(encode::u32(DNS6, &mut code_buf))?;
                w.write_all(encode::usize(s.len(), &mut len_buf))?;
                w.write_all(s.as_bytes())?
            }
            Protocol::Dnsaddr(s) => {
                w.write_all(encode::u32(DNSADDR, &mut code_buf))?;
                w.write_all(encode::usize(s.len(), &mut len_buf))?;
                w.write_all(s.as_bytes())?
            }
            Protocol::P2p(multihash) => {
                w.write_all(encode::u32(P2P, &mut code_buf))?;
                let bytes = multihash.as_bytes();
                w.write_all(encode::usize(bytes.len(), &mut len_buf))?;
                w.write_all(bytes)?
            }
            Protocol::Unix(s) => {
                w.write_all(encode::u32(UNIX, &mut code_buf))?;
                w.write_all(encode::usize(s.len(), &mut len_buf))?;
                w.write_all(s.as_bytes())?
            }
            Protocol::Memory(port) => {
                w.write_all(encode::u32(MEMORY, &mut code_buf))?;
                w.write_u64::<BigEndian>(*port)?
            }
            Protocol::Ws => w.write_all(encode::u32(WS, &mut code_buf))?,
            Protocol::Wss => w.write_all(encode::u32(WSS, &mut code_buf))?,
        }
        Ok(())
    }

    /// Turn this `Protocol` into one that owns its data, thus being valid for any lifetime.
    pub fn acquire<'b>(self) -> Protocol<'b> {
        use self::Protocol::*;
        match self {
            Dns(cow) => Dns(Cow::Owned(cow.into_owned())),
            Dns4(cow) => Dns4(Cow::Owned(cow.into_owned())),
            Dns6(cow) => Dns6(Cow::Owned(cow.into_owned())),
            Dnsaddr(cow) => Dnsaddr(Cow::Owned(cow.into_owned())),
            Ip4(addr) => Ip4(addr),
            Ip6(addr) => Ip6(addr),
            Memory(port) => Memory(port),
            P2p(hash) => P2p(hash),
            Tcp(port) => Tcp(port),
            Udp(port) => Udp(port),
            Unix(cow) => Unix(Cow::Owned(cow.into_owned())),
            Ws => Ws,
            Wss => Wss,
        }
    }

    /// The numeric code identifying this protocol on the wire.
    pub fn code(&self) -> u32 {
        use self::Protocol::*;
        match self {
            Dns(_) => DNS,
            Dns4(_) => DNS4,
            Dns6(_) => DNS6,
            Dnsaddr(_) => DNSADDR,
            Ip4(_) => IP4,
            Ip6(_) => IP6,
            Memory(_) => MEMORY,
            P2p(_) => P2P,
            Tcp(_) => TCP,
            Udp(_) => UDP,
            Unix(_) => UNIX,
            Ws => WS,
            Wss => WSS,
        }
    }
}

impl<'a> fmt::Display for Protocol<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::Protocol::*;
        match self {
            Dns(s) => write!(f, "/dns/{}", s),
            Dns4(s) => write!(f, "/dns4/{}", s),
            Dns6(s) => write!(f, "/dns6/{}", s),
            Dnsaddr(s) => write!(f, "/dnsaddr/{}", s),
            Ip4(addr) => write!(f, "/ip4/{}", addr),
            Ip6(addr) => write!(f, "/ip6/{}", addr),
            Memory(port) => write!(f, "/memory/{}", port),
            P2p(hash) => write!(f, "/p2p/{}", bs58::encode(hash.as_bytes()).into_string()),
            Tcp(port) => write!(f, "/tcp/{}", port),
            Udp(port) => write!(f, "/udp/{}", port),
            Unix(s) => write!(f, "/unix/{}", s),
            Ws => f.write_str("/ws"),
            Wss => f.write_str("/wss"),
        }
    }
}

impl<'a> From<Ipv4Addr> for Protocol<'a> {
    fn from(addr: Ipv4Addr) -> Self {
        Protocol::Ip4(addr)
    }
}

impl<'a> From<Ipv6Addr> for Protocol<'a> {
    fn from(addr: Ipv6Addr) -> Self {
        Protocol::Ip6(addr)
    }
}
