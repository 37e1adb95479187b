//! Transport upgrader.
//!
//! A `TransportUpgrade` wraps another [`Transport`] and performs the whole
//! connection pipeline on every socket it produces:
//!
//! ```text
//! byte pipe -> multistream-select -> secure channel
//!           -> multistream-select -> muxer -> Connection (IStreamMuxer)
//! ```

use crate::muxing::{IStreamMuxer, StreamMuxerEx};
use crate::secure_io::SecureInfo;
use crate::transport::{ConnectionInfo, Transport, TransportError, TransportListener};
use crate::upgrade::{Multistream, Upgrader};
use crate::Multiaddr;
use async_trait::async_trait;
use futures::future::FutureExt;
use futures::{pin_mut, select};
use futures_timer::Delay;
use log::trace;
use meshlink_traits::SplittableReadWrite;
use std::future::Future;
use std::time::Duration;

/// The default time budget for the security and muxer handshakes together.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// A `TransportUpgrade` is a `Transport` that wraps another `Transport` and
/// adds upgrade capabilities to all inbound and outbound connection attempts.
#[derive(Debug, Clone)]
pub struct TransportUpgrade<InnerTrans, TSec, TMux> {
    inner: InnerTrans,
    security: Multistream<TSec>,
    mux: Multistream<TMux>,
    timeout: Duration,
}

impl<InnerTrans, TSec, TMux> TransportUpgrade<InnerTrans, TSec, TMux> {
    /// Wraps around a `Transport` to add upgrade capabilities.
    pub fn new(inner: InnerTrans, security: TSec, mux: TMux) -> Self {
        TransportUpgrade {
            inner,
            security: Multistream::new(security),
            mux: Multistream::new(mux),
            timeout: HANDSHAKE_TIMEOUT,
        }
    }

    /// Overrides the handshake time budget.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<InnerTrans, TSec, TMux> Transport for TransportUpgrade<InnerTrans, TSec, TMux>
where
    InnerTrans: Transport + Send,
    InnerTrans::Output: ConnectionInfo + SplittableReadWrite,
    TSec: Upgrader<InnerTrans::Output> + 'static,
    TSec::Output: SecureInfo + ConnectionInfo + SplittableReadWrite,
    TMux: Upgrader<TSec::Output> + 'static,
    TMux::Output: StreamMuxerEx + 'static,
{
    type Output = IStreamMuxer;
    type Listener = ListenerUpgrade<InnerTrans::Listener, TSec, TMux>;

    fn listen_on(self, addr: Multiaddr) -> Result<Self::Listener, TransportError> {
        let inner_listener = self.inner.listen_on(addr)?;
        Ok(ListenerUpgrade {
            inner: inner_listener,
            security: self.security,
            mux: self.mux,
            timeout: self.timeout,
        })
    }

    async fn dial(self, addr: Multiaddr) -> Result<Self::Output, TransportError> {
        let socket = self.inner.dial(addr).await?;

        let security = self.security;
        let mux = self.mux;
        let upgrade = async move {
            let sec_socket = security.select_outbound(socket).await?;
            trace!("security upgrade completed, upgrading muxer...");
            let muxed = mux.select_outbound(sec_socket).await?;
            Ok(Box::new(muxed) as IStreamMuxer)
        };
        with_timeout(upgrade, self.timeout).await
    }
}

/// Listener of a [`TransportUpgrade`]; upgrades every accepted socket.
pub struct ListenerUpgrade<InnerListener, TSec, TMux> {
    inner: InnerListener,
    security: Multistream<TSec>,
    mux: Multistream<TMux>,
    timeout: Duration,
}

#[async_trait]
impl<InnerListener, TSec, TMux> TransportListener for ListenerUpgrade<InnerListener, TSec, TMux>
where
    InnerListener: TransportListener + Send,
    InnerListener::Output: ConnectionInfo + SplittableReadWrite,
    TSec: Upgrader<InnerListener::Output> + 'static,
    TSec::Output: SecureInfo + ConnectionInfo + SplittableReadWrite,
    TMux: Upgrader<TSec::Output> + 'static,
    TMux::Output: StreamMuxerEx + 'static,
{
    type Output = IStreamMuxer;

    async fn accept(&mut self) -> Result<Self::Output, TransportError> {
        let socket = self.inner.accept().await?;
        trace!("got a new connection, upgrading...");

        let security = self.security.clone();
        let mux = self.mux.clone();
        let upgrade = async move {
            let sec_socket = security.select_inbound(socket).await?;
            trace!("security upgrade completed, upgrading muxer...");
            let muxed = mux.select_inbound(sec_socket).await?;
            Ok(Box::new(muxed) as IStreamMuxer)
        };
        with_timeout(upgrade, self.timeout).await
    }

    fn multi_addr(&self) -> Multiaddr {
        self.inner.multi_addr()
    }
}

async fn with_timeout<T, F>(fut: F, timeout: Duration) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>> + Send,
{
    let delay = Delay::new(timeout).fuse();
    let fut = fut.fuse();
    pin_mut!(delay, fut);
    select! {
        result = fut => result,
        _ = delay => Err(TransportError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::Channel;
    use crate::upgrade::DummyUpgrader;
    use async_std::task;

    #[test]
    fn timeout_elapses() {
        task::block_on(async {
            let never = futures::future::pending::<Result<(), TransportError>>();
            let res = with_timeout(never, Duration::from_millis(50)).await;
            assert!(matches!(res, Err(TransportError::Timeout)));
        });
    }

    // The full pipeline (secio/noise + mplex) over this upgrader lives in the
    // demos crate; here the plumbing is checked with dummy upgrades only.
    #[test]
    fn dummy_upgrades_are_plumbed() {
        let (a, b) = Channel::pair();
        let inbound = task::spawn(async move {
            Multistream::new(DummyUpgrader::new()).select_inbound(a).await.map(drop)
        });
        let outbound = task::spawn(async move {
            Multistream::new(DummyUpgrader::new()).select_outbound(b).await.map(drop)
        });
        task::block_on(async move {
            inbound.await.unwrap();
            outbound.await.unwrap();
        });
    }
}
