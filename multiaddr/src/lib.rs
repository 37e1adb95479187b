//! Implementation of [multiaddr](https://github.com/multiformats/multiaddr)
//! self-describing addresses: an ordered chain of protocol components with a
//! bijective text form and a length-prefixed binary form.

mod errors;
pub mod protocol;

pub use self::errors::{Error, Result};
pub use self::protocol::Protocol;
pub use multihash::Multihash;

use std::{
    convert::TryFrom,
    fmt,
    iter::FromIterator,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
    sync::Arc,
};

/// Representation of a Multiaddr.
///
/// Cloning is cheap; the underlying byte string is shared.
#[derive(PartialEq, Eq, Clone, Hash)]
pub struct Multiaddr {
    bytes: Arc<Vec<u8>>,
}

impl Multiaddr {
    /// Create a new, empty multiaddress.
    pub fn empty() -> Self {
        Self {
            bytes: Arc::new(Vec::new()),
        }
    }

    /// The length in bytes of this multiaddress.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the length of this multiaddress is 0.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Return a copy of this [`Multiaddr`]'s byte representation.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Adds an already-parsed address component to the end of this multiaddr.
    pub fn push(&mut self, p: Protocol<'_>) {
        let mut w = Vec::clone(&self.bytes);
        p.write_bytes(&mut w).expect("writing to a Vec never fails");
        self.bytes = Arc::new(w);
    }

    /// Pops the last `Protocol` of this multiaddr, or `None` if the multiaddr is empty.
    pub fn pop<'a>(&mut self) -> Option<Protocol<'a>> {
        let mut slice = &self.bytes[..]; // the remaining multiaddr slice
        if slice.is_empty() {
            return None;
        }
        let protocol = loop {
            let (p, s) = Protocol::from_bytes(slice).expect("`self.bytes` is a valid multiaddr");
            if s.is_empty() {
                break p.acquire();
            }
            slice = s
        };
        let remaining_len = self.bytes.len() - slice.len();
        let mut w = Vec::clone(&self.bytes);
        w.truncate(remaining_len);
        self.bytes = Arc::new(w);
        Some(protocol)
    }

    /// Like [`Multiaddr::push`] but consumes `self`.
    pub fn with(mut self, p: Protocol<'_>) -> Self {
        self.push(p);
        self
    }

    /// Returns the components of this multiaddress.
    pub fn iter(&self) -> Iter<'_> {
        Iter(&self.bytes)
    }

    /// Returns the first component whose protocol code is contained in `codes`.
    ///
    /// This is the lookup used to pick e.g. the ip component out of a chain.
    pub fn value_of(&self, codes: &[u32]) -> Option<Protocol<'_>> {
        self.iter().find(|p| codes.contains(&p.code()))
    }

    /// Returns the components whose protocol code is contained in `codes`,
    /// in address order.
    pub fn filter(&self, codes: &[u32]) -> Vec<Protocol<'_>> {
        self.iter().filter(|p| codes.contains(&p.code())).collect()
    }
}

impl fmt::Debug for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.to_string().fmt(f)
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for c in self.iter() {
            c.fmt(f)?;
        }
        Ok(())
    }
}

impl AsRef<[u8]> for Multiaddr {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl<'a> IntoIterator for &'a Multiaddr {
    type Item = Protocol<'a>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        Iter(&self.bytes)
    }
}

impl<'a> FromIterator<Protocol<'a>> for Multiaddr {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Protocol<'a>>,
    {
        let mut writer = Vec::new();
        for cmp in iter {
            cmp.write_bytes(&mut writer).expect("writing to a Vec never fails");
        }
        Multiaddr {
            bytes: Arc::new(writer),
        }
    }
}

impl FromStr for Multiaddr {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let mut writer = Vec::new();
        let mut parts = input.split('/').peekable();

        if Some("") != parts.next() {
            // A multiaddr must start with `/`
            return Err(Error::InvalidMultiaddr);
        }

        while parts.peek().is_some() {
            // a single trailing `/` is tolerated
            if parts.peek() == Some(&"") {
                parts.next();
                if parts.peek().is_some() {
                    return Err(Error::InvalidMultiaddr);
                }
                break;
            }
            let p = Protocol::from_str_parts(&mut parts)?;
            p.write_bytes(&mut writer).expect("writing to a Vec never fails");
        }

        Ok(Multiaddr {
            bytes: Arc::new(writer),
        })
    }
}

/// Iterator over `Multiaddr` [`Protocol`]s.
pub struct Iter<'a>(&'a [u8]);

impl<'a> Iterator for Iter<'a> {
    type Item = Protocol<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.0.is_empty() {
            return None;
        }
        let (p, next_data) =
            Protocol::from_bytes(self.0).expect("`Multiaddr` is known to be valid");
        self.0 = next_data;
        Some(p)
    }
}

impl<'a> From<Protocol<'a>> for Multiaddr {
    fn from(p: Protocol<'a>) -> Multiaddr {
        let mut w = Vec::new();
        p.write_bytes(&mut w).expect("writing to a Vec never fails");
        Multiaddr { bytes: Arc::new(w) }
    }
}

impl From<IpAddr> for Multiaddr {
    fn from(v: IpAddr) -> Multiaddr {
        match v {
            IpAddr::V4(a) => a.into(),
            IpAddr::V6(a) => a.into(),
        }
    }
}

impl From<Ipv4Addr> for Multiaddr {
    fn from(v: Ipv4Addr) -> Multiaddr {
        Protocol::Ip4(v).into()
    }
}

impl From<Ipv6Addr> for Multiaddr {
    fn from(v: Ipv6Addr) -> Multiaddr {
        Protocol::Ip6(v).into()
    }
}

impl TryFrom<Vec<u8>> for Multiaddr {
    type Error = Error;

    fn try_from(v: Vec<u8>) -> Result<Self> {
        // Check if the argument is a valid multiaddr by parsing all components.
        let mut slice = &v[..];
        while !slice.is_empty() {
            let (_, s) = Protocol::from_bytes(slice)?;
            slice = s
        }
        Ok(Multiaddr { bytes: Arc::new(v) })
    }
}

impl TryFrom<String> for Multiaddr {
    type Error = Error;

    fn try_from(s: String) -> Result<Multiaddr> {
        s.parse()
    }
}

impl<'a> TryFrom<&'a str> for Multiaddr {
    type Error = Error;

    fn try_from(s: &'a str) -> Result<Multiaddr> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn ma(s: &str) -> Multiaddr {
        s.parse().expect("valid multiaddr")
    }

    #[test]
    fn parse_ip4_tcp() {
        let addr = ma("/ip4/127.0.0.1/tcp/1234");
        let components = addr.iter().collect::<Vec<_>>();
        assert_eq!(
            components,
            vec![
                Protocol::Ip4(Ipv4Addr::new(127, 0, 0, 1)),
                Protocol::Tcp(1234)
            ]
        );
        assert_eq!(addr.to_string(), "/ip4/127.0.0.1/tcp/1234");
        assert_eq!(
            addr.to_vec(),
            vec![0x04, 0x7f, 0x00, 0x00, 0x01, 0x06, 0x04, 0xd2]
        );
    }

    #[test]
    fn parse_requires_leading_slash() {
        assert!("ip4/1.2.3.4/tcp/1234".parse::<Multiaddr>().is_err());
    }

    #[test]
    fn parse_rejects_unknown_protocol() {
        assert!("/ip4/1.2.3.4/carrier-pigeon/9".parse::<Multiaddr>().is_err());
    }

    #[test]
    fn parse_rejects_missing_value() {
        assert!("/ip4".parse::<Multiaddr>().is_err());
        assert!("/ip4/1.2.3.4/tcp".parse::<Multiaddr>().is_err());
    }

    #[test]
    fn trailing_slash_is_stripped() {
        assert_eq!(ma("/ip4/1.2.3.4/tcp/80/"), ma("/ip4/1.2.3.4/tcp/80"));
        assert!("/ip4/1.2.3.4//tcp/80".parse::<Multiaddr>().is_err());
    }

    #[test]
    fn unix_path_is_terminal() {
        let addr = ma("/unix/tmp/p2p.sock");
        assert_eq!(
            addr.iter().collect::<Vec<_>>(),
            vec![Protocol::Unix(Cow::Borrowed("tmp/p2p.sock"))]
        );
        assert_eq!(addr.to_string(), "/unix/tmp/p2p.sock");
    }

    #[test]
    fn binary_round_trip() {
        for s in &[
            "/ip4/1.2.3.4/tcp/80",
            "/ip6/2601:9:4f81:9700:803e:ca65:66e8:c21/udp/1234",
            "/dnsaddr/bootstrap.libp2p.io",
            "/ip4/127.0.0.1/tcp/9090/ws",
            "/memory/1234567890",
            "/unix/var/run/sock",
        ] {
            let addr = ma(s);
            let decoded = Multiaddr::try_from(addr.to_vec()).expect("valid bytes");
            assert_eq!(addr, decoded);
        }
    }

    #[test]
    fn text_form_is_stable() {
        // normalization may rewrite the value, but one pass is a fixed point
        for s in &["/ip6/::1/tcp/80", "/ip4/8.8.8.8/udp/53", "/ip6/2001:db8::/tcp/1"] {
            let once = ma(s).to_string();
            let twice = ma(&once).to_string();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn p2p_component() {
        let addr = ma("/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ");
        assert_eq!(
            addr.to_string(),
            "/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ"
        );
        assert!(addr.value_of(&[protocol::P2P]).is_some());
    }

    #[test]
    fn push_pop() {
        let mut addr = ma("/ip4/1.2.3.4");
        addr.push(Protocol::Tcp(80));
        assert_eq!(addr.to_string(), "/ip4/1.2.3.4/tcp/80");
        assert_eq!(addr.pop(), Some(Protocol::Tcp(80)));
        assert_eq!(addr.pop(), Some(Protocol::Ip4(Ipv4Addr::new(1, 2, 3, 4))));
        assert_eq!(addr.pop(), None);
    }

    #[test]
    fn filter_and_value_of() {
        let addr = ma("/ip4/127.0.0.1/tcp/5001/ws");
        let transports = addr.filter(&[protocol::TCP, protocol::UDP]);
        assert_eq!(transports, vec![Protocol::Tcp(5001)]);
        assert_eq!(
            addr.value_of(&[protocol::IP4, protocol::IP6]),
            Some(Protocol::Ip4(Ipv4Addr::new(127, 0, 0, 1)))
        );
        assert_eq!(addr.value_of(&[protocol::UNIX]), None);
    }
}
