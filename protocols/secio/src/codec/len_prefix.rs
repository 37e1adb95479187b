use meshlink_traits::{ReadEx, WriteEx};
use std::io;

/// Frames the raw socket during the handshake: every handshake message is
/// prefixed by a 4-byte big-endian length.
pub struct LengthPrefixSocket<T> {
    inner: T,
    max_frame_len: usize,
}

impl<T> LengthPrefixSocket<T>
where
    T: ReadEx + WriteEx + Unpin,
{
    /// Creates a new socket with the given maximum accepted frame length.
    pub fn new(socket: T, max_frame_len: usize) -> Self {
        LengthPrefixSocket {
            inner: socket,
            max_frame_len,
        }
    }

    /// Hands the raw socket back once the handshake frames are done.
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub async fn recv_frame(&mut self) -> io::Result<Vec<u8>> {
        self.inner.read_one_fixed(self.max_frame_len).await
    }

    pub async fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.inner.write_one_fixed(frame).await?;
        self.inner.flush2().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlink_core::transport::memory::Channel;

    #[test]
    fn frames_survive_the_pipe() {
        async_std::task::block_on(async {
            let (a, b) = Channel::pair();
            let mut a = LengthPrefixSocket::new(a, 1024);
            let mut b = LengthPrefixSocket::new(b, 1024);

            a.send_frame(b"first").await.unwrap();
            a.send_frame(b"second").await.unwrap();
            assert_eq!(b.recv_frame().await.unwrap(), b"first");
            assert_eq!(b.recv_frame().await.unwrap(), b"second");
        });
    }
}
