//! Stream muxer abstraction.
//!
//! A muxer turns one connection into many logical streams. Implementations
//! (e.g. mplex) provide the framing; consumers only see [`StreamMuxer`]
//! trait objects and cloneable stream handles.

use crate::secure_io::SecureInfo;
use crate::transport::{ConnectionInfo, TransportError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use meshlink_traits::{ReadEx, WriteEx};

/// Metadata of a muxed stream.
pub trait StreamInfo: Send {
    /// The muxer-local id of this stream.
    fn id(&self) -> usize;
}

/// A cloneable duplex stream handle produced by a muxer.
#[async_trait]
pub trait ReadWriteEx: ReadEx + WriteEx + StreamInfo + Unpin {
    fn box_clone(&self) -> IReadWrite;
}

pub type IReadWrite = Box<dyn ReadWriteEx + Send>;

impl Clone for IReadWrite {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

#[async_trait]
impl ReadEx for IReadWrite {
    async fn read2(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        (**self).read2(buf).await
    }
}

#[async_trait]
impl WriteEx for IReadWrite {
    async fn write2(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (**self).write2(buf).await
    }

    async fn flush2(&mut self) -> std::io::Result<()> {
        (**self).flush2().await
    }

    async fn close2(&mut self) -> std::io::Result<()> {
        (**self).close2().await
    }
}

/// A stream multiplexer over an (already secured) connection.
#[async_trait]
pub trait StreamMuxer {
    /// Opens a new outbound logical stream.
    async fn open_stream(&mut self) -> Result<IReadWrite, TransportError>;

    /// Accepts the next inbound logical stream opened by the remote.
    async fn accept_stream(&mut self) -> Result<IReadWrite, TransportError>;

    /// Closes the muxer and the underlying connection, resetting all
    /// remaining streams.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Returns the background task that drives the muxer's read loop, if it
    /// has not been taken yet. The caller is expected to spawn it.
    fn task(&mut self) -> Option<BoxFuture<'static, ()>>;

    fn box_clone(&self) -> IStreamMuxer;
}

/// The full trait-object surface of a muxed connection: muxing plus the
/// secure-channel and transport metadata gathered on the way up.
pub trait StreamMuxerEx: StreamMuxer + SecureInfo + ConnectionInfo + Send {}

pub type IStreamMuxer = Box<dyn StreamMuxerEx>;

impl Clone for IStreamMuxer {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
