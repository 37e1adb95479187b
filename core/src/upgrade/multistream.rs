use crate::multistream::Negotiator;
use crate::transport::TransportError;
use crate::upgrade::Upgrader;
use log::trace;
use meshlink_traits::{ReadEx, WriteEx};

/// Wraps an [`Upgrader`] so that the upgrade it performs is first agreed on
/// with the remote via multistream-select.
///
/// The protocols announced first have a higher priority.
#[derive(Debug, Clone)]
pub struct Multistream<U> {
    inner: U,
}

impl<U> Multistream<U> {
    /// Add `Multistream` on top of any `Upgrader`.
    pub fn new(inner: U) -> Self {
        Self { inner }
    }
}

impl<U> Multistream<U> {
    pub async fn select_inbound<C>(self, socket: C) -> Result<U::Output, TransportError>
    where
        U: Upgrader<C> + Send,
        C: ReadEx + WriteEx + Unpin + Send,
    {
        trace!("starting multistream select for inbound...");
        let negotiator = Negotiator::new_with_protocols(self.inner.protocol_info());
        let (info, socket) = negotiator.negotiate(socket).await?;
        self.inner.upgrade_inbound(socket, info).await
    }

    pub async fn select_outbound<C>(self, socket: C) -> Result<U::Output, TransportError>
    where
        U: Upgrader<C> + Send,
        C: ReadEx + WriteEx + Unpin + Send,
    {
        trace!("starting multistream select for outbound...");
        let negotiator = Negotiator::new_with_protocols(self.inner.protocol_info());
        let (info, socket) = negotiator.select_one(socket).await?;
        self.inner.upgrade_outbound(socket, info).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::Channel;
    use crate::upgrade::DummyUpgrader;
    use async_std::task;

    #[test]
    fn select_then_upgrade() {
        let (a, b) = Channel::pair();

        let inbound = task::spawn(async move {
            Multistream::new(DummyUpgrader::new()).select_inbound(a).await
        });
        let outbound = task::spawn(async move {
            Multistream::new(DummyUpgrader::new()).select_outbound(b).await
        });

        task::block_on(async move {
            inbound.await.expect("inbound upgrade");
            outbound.await.expect("outbound upgrade");
        });
    }
}
