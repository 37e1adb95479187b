//! The `/ipfs/ping/1.0.0` echo protocol: 32 random bytes out, the same 32
//! bytes back. Used to keep connections warm and to measure round-trip time.

use crate::upgrade::ProtocolId;
use log::trace;
use meshlink_traits::{ReadEx, WriteEx};
use std::io;
use std::time::{Duration, Instant};

pub const PING_PROTOCOL: ProtocolId = b"/ipfs/ping/1.0.0";

const PING_SIZE: usize = 32;

/// Sends one ping over the given (already negotiated) stream and waits for
/// the echo, returning the round-trip time.
pub async fn ping<T>(stream: &mut T) -> io::Result<Duration>
where
    T: ReadEx + WriteEx + Unpin,
{
    let payload = rand::random::<[u8; PING_SIZE]>();
    let started = Instant::now();

    stream.write_all2(&payload).await?;
    stream.flush2().await?;

    let mut echo = [0u8; PING_SIZE];
    stream.read_exact2(&mut echo).await?;
    if echo != payload {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "ping payload mismatch"));
    }

    let rtt = started.elapsed();
    trace!("ping took {:?}", rtt);
    Ok(rtt)
}

/// Serves the listener side: echoes ping payloads until the remote closes
/// the stream.
pub async fn handle<T>(stream: &mut T) -> io::Result<()>
where
    T: ReadEx + WriteEx + Unpin,
{
    let mut payload = [0u8; PING_SIZE];
    loop {
        let mut filled = 0;
        while filled < PING_SIZE {
            let n = stream.read2(&mut payload[filled..]).await?;
            if n == 0 {
                return Ok(()); // remote is done
            }
            filled += n;
        }
        stream.write_all2(&payload).await?;
        stream.flush2().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::Channel;
    use async_std::task;

    #[test]
    fn ping_echo() {
        let (mut a, mut b) = Channel::pair();
        let server = task::spawn(async move { handle(&mut b).await });
        task::block_on(async move {
            let rtt = ping(&mut a).await.expect("ping succeeds");
            assert!(rtt <= Duration::from_secs(1));
            a.close2().await.unwrap();
            drop(a);
            server.await.expect("handler exits cleanly");
        });
    }
}
