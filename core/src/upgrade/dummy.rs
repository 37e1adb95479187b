use crate::transport::TransportError;
use crate::upgrade::{UpgradeInfo, Upgrader};
use async_trait::async_trait;
use log::trace;

/// An upgrader which makes no change to the socket. Handy for tests and for
/// transports that need a placeholder upgrade.
#[derive(Debug, Copy, Clone, Default)]
pub struct DummyUpgrader;

impl DummyUpgrader {
    pub fn new() -> Self {
        DummyUpgrader
    }
}

impl UpgradeInfo for DummyUpgrader {
    type Info = &'static [u8];

    fn protocol_info(&self) -> Vec<Self::Info> {
        vec![b"/dummy/1.0.0"]
    }
}

#[async_trait]
impl<C: Send + 'static> Upgrader<C> for DummyUpgrader {
    type Output = C;

    async fn upgrade_inbound(
        self,
        socket: C,
        _info: <Self as UpgradeInfo>::Info,
    ) -> Result<Self::Output, TransportError> {
        trace!("dummy upgrading inbound");
        Ok(socket)
    }

    async fn upgrade_outbound(
        self,
        socket: C,
        _info: <Self as UpgradeInfo>::Info,
    ) -> Result<Self::Output, TransportError> {
        trace!("dummy upgrading outbound");
        Ok(socket)
    }
}
