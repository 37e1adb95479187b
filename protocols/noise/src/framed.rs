//! Length-prefixed framing of Noise messages: 2-byte big-endian length,
//! then the ciphertext.

use crate::error::NoiseError;
use meshlink_traits::{ReadEx, WriteEx};
use snow::{HandshakeState, StatelessTransportState};
use std::io;
use std::sync::Arc;

/// Noise limits a message to 65535 bytes.
pub(crate) const MAX_FRAME_LEN: usize = 65535;
/// Every encrypted frame carries a 16-byte AEAD tag.
pub(crate) const TAG_LEN: usize = 16;
pub(crate) const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - TAG_LEN;

pub(crate) async fn read_frame_bytes<T: ReadEx + Unpin>(io: &mut T) -> io::Result<Vec<u8>> {
    let mut len = [0u8; 2];
    io.read_exact2(&mut len).await?;
    let n = u16::from_be_bytes(len) as usize;
    let mut frame = vec![0u8; n];
    io.read_exact2(&mut frame).await?;
    Ok(frame)
}

pub(crate) async fn write_frame_bytes<T: WriteEx + Unpin>(io: &mut T, frame: &[u8]) -> io::Result<()> {
    debug_assert!(frame.len() <= MAX_FRAME_LEN);
    let len = (frame.len() as u16).to_be_bytes();
    io.write_all2(&len).await?;
    io.write_all2(frame).await?;
    io.flush2().await
}

/// A socket paired with a Noise handshake tape.
pub(crate) struct NoiseFramed<T> {
    io: T,
    session: HandshakeState,
}

impl<T> NoiseFramed<T>
where
    T: ReadEx + WriteEx + Unpin,
{
    pub(crate) fn new(io: T, session: HandshakeState) -> Self {
        NoiseFramed { io, session }
    }

    /// Writes the next handshake message, carrying `payload`.
    pub(crate) async fn send(&mut self, payload: &[u8]) -> Result<(), NoiseError> {
        // room for the payload, the handshake public keys and the tags
        let mut buf = vec![0u8; payload.len() + 256];
        let n = self.session.write_message(payload, &mut buf)?;
        if n > MAX_FRAME_LEN {
            return Err(NoiseError::FrameTooLarge(n));
        }
        write_frame_bytes(&mut self.io, &buf[..n]).await?;
        Ok(())
    }

    /// Reads the next handshake message, returning its payload.
    pub(crate) async fn recv(&mut self) -> Result<Vec<u8>, NoiseError> {
        let frame = read_frame_bytes(&mut self.io).await?;
        let mut out = vec![0u8; frame.len()];
        let n = self.session.read_message(&frame, &mut out)?;
        out.truncate(n);
        Ok(out)
    }

    /// Finishes the handshake: returns the socket, the split-capable cipher
    /// states and the remote's static Noise key.
    pub(crate) fn into_stateless(
        self,
    ) -> Result<(T, Arc<StatelessTransportState>, Vec<u8>), NoiseError> {
        let remote_static = self
            .session
            .get_remote_static()
            .ok_or(NoiseError::UnexpectedPayload)?
            .to_vec();
        let state = self.session.into_stateless_transport_mode()?;
        Ok((self.io, Arc::new(state), remote_static))
    }
}
