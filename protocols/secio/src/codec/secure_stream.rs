use log::{debug, trace};

use std::{cmp::min, io};

use crate::{codec::Hmac, crypto::BoxStreamCipher, error::SecioError};

use async_trait::async_trait;
use meshlink_traits::{ReadEx, SplitEx, WriteEx};

/// Read half of the encrypted channel.
pub struct SecureStreamReader<R> {
    socket: R,

    max_frame_len: usize,

    decode_hmac: Hmac,
    decode_cipher: BoxStreamCipher,

    /// Internal buffer for frames larger than the caller's read buffer.
    /// Subsequent reads drain it before touching the socket again.
    recv_buf: Vec<u8>,
}

impl<R> SecureStreamReader<R>
where
    R: ReadEx + 'static,
{
    fn new(socket: R, max_frame_len: usize, decode_cipher: BoxStreamCipher, decode_hmac: Hmac) -> Self {
        SecureStreamReader {
            socket,
            max_frame_len,
            decode_cipher,
            decode_hmac,
            recv_buf: Vec::default(),
        }
    }

    #[inline]
    fn drain(&mut self, buf: &mut [u8]) -> usize {
        if self.recv_buf.is_empty() {
            return 0;
        }
        let n = min(buf.len(), self.recv_buf.len());
        buf[..n].copy_from_slice(&self.recv_buf[..n]);
        self.recv_buf = self.recv_buf.split_off(n);
        n
    }

    /// Checks the MAC trailer of a frame and decrypts its content.
    #[inline]
    fn decode_buffer(&mut self, mut frame: Vec<u8>) -> Result<Vec<u8>, SecioError> {
        if frame.len() < self.decode_hmac.num_bytes() {
            debug!("frame too short when decoding secio frame");
            return Err(SecioError::FrameTooShort);
        }
        let content_length = frame.len() - self.decode_hmac.num_bytes();
        {
            let (crypted_data, expected_hash) = frame.split_at(content_length);
            debug_assert_eq!(expected_hash.len(), self.decode_hmac.num_bytes());
            if !self.decode_hmac.verify(crypted_data, expected_hash) {
                debug!("hmac mismatch when decoding secio frame");
                return Err(SecioError::HmacNotMatching);
            }
        }
        frame.truncate(content_length);
        Ok(self.decode_cipher.process(&frame))
    }
}

#[async_trait]
impl<R> ReadEx for SecureStreamReader<R>
where
    R: ReadEx + 'static,
{
    async fn read2(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // drain leftovers of an earlier frame first
        let copied = self.drain(buf);
        if copied > 0 {
            return Ok(copied);
        }

        let frame = self.socket.read_one_fixed(self.max_frame_len).await?;
        trace!("received encrypted frame of {} bytes", frame.len());

        let decoded = self.decode_buffer(frame).map_err(io::Error::from)?;

        let n = decoded.len();
        if buf.len() >= n {
            buf[..n].copy_from_slice(&decoded);
            Ok(n)
        } else {
            self.recv_buf = decoded;
            Ok(self.drain(buf))
        }
    }
}

/// Write half of the encrypted channel.
pub struct SecureStreamWriter<W> {
    socket: W,

    encode_hmac: Hmac,
    encode_cipher: BoxStreamCipher,
}

impl<W> SecureStreamWriter<W>
where
    W: WriteEx + 'static,
{
    fn new(socket: W, encode_cipher: BoxStreamCipher, encode_hmac: Hmac) -> Self {
        SecureStreamWriter {
            socket,
            encode_cipher,
            encode_hmac,
        }
    }

    /// Encrypts the data and appends the MAC trailer.
    #[inline]
    fn encode_buffer(&mut self, buf: &[u8]) -> Vec<u8> {
        let mut out = self.encode_cipher.process(buf);
        let signature = self.encode_hmac.sign(&out);
        out.extend_from_slice(&signature);
        out
    }
}

#[async_trait]
impl<W> WriteEx for SecureStreamWriter<W>
where
    W: WriteEx + 'static,
{
    async fn write2(&mut self, buf: &[u8]) -> io::Result<usize> {
        let frame = self.encode_buffer(buf);
        trace!("sending encrypted frame of {} bytes", frame.len());
        self.socket.write_one_fixed(&frame).await?;
        Ok(buf.len())
    }

    async fn flush2(&mut self) -> io::Result<()> {
        self.socket.flush2().await
    }

    async fn close2(&mut self) -> io::Result<()> {
        self.socket.close2().await
    }
}

/// Encrypted stream: the output of a successful SECIO handshake.
pub struct SecureStream<R, W> {
    reader: SecureStreamReader<R>,
    writer: SecureStreamWriter<W>,
    /// Our own nonce; the remote must return it as the first message of the
    /// secured channel.
    nonce: Vec<u8>,
}

impl<R, W> SecureStream<R, W>
where
    R: ReadEx + 'static,
    W: WriteEx + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        reader: R,
        writer: W,
        max_frame_len: usize,
        decode_cipher: BoxStreamCipher,
        decode_hmac: Hmac,
        encode_cipher: BoxStreamCipher,
        encode_hmac: Hmac,
        nonce: Vec<u8>,
    ) -> Self {
        SecureStream {
            reader: SecureStreamReader::new(reader, max_frame_len, decode_cipher, decode_hmac),
            writer: SecureStreamWriter::new(writer, encode_cipher, encode_hmac),
            nonce,
        }
    }

    /// Verifies that the first message of the secured channel is our nonce.
    pub(crate) async fn verify_nonce(&mut self) -> Result<(), SecioError> {
        if !self.nonce.is_empty() {
            let mut nonce = vec![0u8; self.nonce.len()];
            self.reader.read_exact2(&mut nonce).await?;
            if nonce != self.nonce {
                return Err(SecioError::NonceVerificationFailed);
            }
            self.nonce.clear();
            self.nonce.shrink_to_fit();
        }
        Ok(())
    }
}

#[async_trait]
impl<R, W> ReadEx for SecureStream<R, W>
where
    R: ReadEx + 'static,
    W: WriteEx + 'static,
{
    async fn read2(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read2(buf).await
    }
}

#[async_trait]
impl<R, W> WriteEx for SecureStream<R, W>
where
    R: ReadEx + 'static,
    W: WriteEx + 'static,
{
    async fn write2(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write2(buf).await
    }

    async fn flush2(&mut self) -> io::Result<()> {
        self.writer.flush2().await
    }

    async fn close2(&mut self) -> io::Result<()> {
        self.writer.close2().await
    }
}

impl<R, W> SplitEx for SecureStream<R, W>
where
    R: ReadEx + Unpin + 'static,
    W: WriteEx + Unpin + 'static,
{
    type Reader = SecureStreamReader<R>;
    type Writer = SecureStreamWriter<W>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{cipher::CipherType, new_stream, CryptoMode};
    use crate::Digest;
    use async_std::task;
    use meshlink_core::transport::memory::Channel;
    use meshlink_traits::SplitEx;

    fn secure_pair(
        cipher: CipherType,
    ) -> (
        SecureStream<impl ReadEx + 'static, impl WriteEx + 'static>,
        SecureStream<impl ReadEx + 'static, impl WriteEx + 'static>,
    ) {
        let cipher_key = (0..cipher.key_size()).map(|_| rand::random::<u8>()).collect::<Vec<_>>();
        let iv = (0..cipher.iv_size()).map(|_| rand::random::<u8>()).collect::<Vec<_>>();
        let hmac_key: [u8; 32] = rand::random();

        let (a, b) = Channel::pair();
        let (a_r, a_w) = a.split();
        let (b_r, b_w) = b.split();

        let a = SecureStream::new(
            a_r,
            a_w,
            4096,
            new_stream(cipher, &cipher_key, &iv, CryptoMode::Decrypt),
            Hmac::from_key(Digest::Sha256, &hmac_key),
            new_stream(cipher, &cipher_key, &iv, CryptoMode::Encrypt),
            Hmac::from_key(Digest::Sha256, &hmac_key),
            Vec::new(),
        );
        let b = SecureStream::new(
            b_r,
            b_w,
            4096,
            new_stream(cipher, &cipher_key, &iv, CryptoMode::Decrypt),
            Hmac::from_key(Digest::Sha256, &hmac_key),
            new_stream(cipher, &cipher_key, &iv, CryptoMode::Encrypt),
            Hmac::from_key(Digest::Sha256, &hmac_key),
            Vec::new(),
        );
        (a, b)
    }

    fn secure_codec_encode_then_decode(cipher: CipherType) {
        task::block_on(async move {
            let (mut a, mut b) = secure_pair(cipher);
            let data = b"hello world";

            a.write2(data).await.unwrap();
            let mut received = [0u8; 11];
            b.read_exact2(&mut received).await.unwrap();
            assert_eq!(&received, data);

            // and the other direction
            b.write2(data).await.unwrap();
            a.read_exact2(&mut received).await.unwrap();
            assert_eq!(&received, data);
        });
    }

    #[test]
    fn secure_codec_encode_then_decode_aes128ctr() {
        secure_codec_encode_then_decode(CipherType::Aes128Ctr);
    }

    #[test]
    fn secure_codec_encode_then_decode_aes256ctr() {
        secure_codec_encode_then_decode(CipherType::Aes256Ctr);
    }

    #[test]
    fn small_read_buffer_drains_frame() {
        task::block_on(async move {
            let (mut a, mut b) = secure_pair(CipherType::Aes128Ctr);
            a.write2(b"0123456789").await.unwrap();

            let mut buf = [0u8; 4];
            assert_eq!(b.read2(&mut buf).await.unwrap(), 4);
            assert_eq!(&buf, b"0123");
            assert_eq!(b.read2(&mut buf).await.unwrap(), 4);
            assert_eq!(&buf, b"4567");
            assert_eq!(b.read2(&mut buf).await.unwrap(), 2);
            assert_eq!(&buf[..2], b"89");
        });
    }

    #[test]
    fn tampered_frame_is_rejected() {
        task::block_on(async move {
            let (a, b) = Channel::pair();
            let (_a_r, mut a_w) = a.split();

            let key = [1u8; 16];
            let iv = [2u8; 16];
            let hmac = Hmac::from_key(Digest::Sha256, &[3u8; 32]);

            // hand-build a frame and flip one bit of the MAC
            let mut cipher = new_stream(CipherType::Aes128Ctr, &key, &iv, CryptoMode::Encrypt);
            let mut frame = cipher.process(b"attack at dawn");
            frame.extend_from_slice(&hmac.sign(&frame));
            let last = frame.len() - 1;
            frame[last] ^= 0x01;
            a_w.write_one_fixed(&frame).await.unwrap();

            let (b_r, b_w) = b.split();
            let mut secured = SecureStream::new(
                b_r,
                b_w,
                4096,
                new_stream(CipherType::Aes128Ctr, &key, &iv, CryptoMode::Decrypt),
                hmac.clone(),
                new_stream(CipherType::Aes128Ctr, &key, &iv, CryptoMode::Encrypt),
                hmac,
                Vec::new(),
            );
            let mut buf = [0u8; 32];
            assert!(secured.read2(&mut buf).await.is_err());
        });
    }
}
