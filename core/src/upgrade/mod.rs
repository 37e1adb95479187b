//! Connection upgrades.
//!
//! An [`Upgrader`] layers a protocol (secure channel, stream muxer, ...) on
//! top of an already established socket. Which upgrade runs is decided by
//! multistream-select against the names the upgrader announces via
//! [`UpgradeInfo`].

mod dummy;
mod multistream;
mod select;

pub use dummy::DummyUpgrader;
pub use multistream::Multistream;
pub use select::Selector;

use crate::transport::TransportError;
use async_trait::async_trait;
use std::borrow::Cow;

/// A protocol identifier as announced on the wire, e.g. `b"/secio/1.0.0"`.
pub type ProtocolId = &'static [u8];

/// Types serving as a protocol name.
pub trait ProtocolName: Send {
    /// The raw bytes of the protocol name, e.g. `/mplex/6.7.0`.
    fn protocol_name(&self) -> &[u8];

    /// The name rendered for logs. Lossy for non-UTF-8 names.
    fn protocol_name_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.protocol_name())
    }
}

impl ProtocolName for &[u8] {
    fn protocol_name(&self) -> &[u8] {
        self
    }
}

impl ProtocolName for Vec<u8> {
    fn protocol_name(&self) -> &[u8] {
        self
    }
}

impl ProtocolName for &str {
    fn protocol_name(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl ProtocolName for String {
    fn protocol_name(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Common trait for upgrades that can be applied on inbound connections,
/// outbound connections, or both.
pub trait UpgradeInfo {
    /// The type of the protocol names, almost always `&'static [u8]`.
    type Info: ProtocolName + Clone + Send + Sync + 'static;

    /// The protocol names to offer during multistream-select, in order of
    /// preference.
    fn protocol_info(&self) -> Vec<Self::Info>;
}

/// An upgrade procedure turning a socket into something richer.
#[async_trait]
pub trait Upgrader<C>: UpgradeInfo + Clone + Send {
    type Output: Send;

    /// Runs the upgrade as the listening side. `info` is the protocol name
    /// that multistream-select agreed on.
    async fn upgrade_inbound(
        self,
        socket: C,
        info: <Self as UpgradeInfo>::Info,
    ) -> Result<Self::Output, TransportError>;

    /// Runs the upgrade as the dialing side.
    async fn upgrade_outbound(
        self,
        socket: C,
        info: <Self as UpgradeInfo>::Info,
    ) -> Result<Self::Output, TransportError>;
}
