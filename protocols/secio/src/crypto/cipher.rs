/// Possible symmetric ciphers of the secured channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherType {
    /// AES-128 in counter mode, authenticated per frame by the channel HMAC.
    Aes128Ctr,
    /// AES-256 in counter mode, authenticated per frame by the channel HMAC.
    Aes256Ctr,
}

impl CipherType {
    /// Returns the size of in bytes of the key expected by the cipher.
    pub const fn key_size(self) -> usize {
        match self {
            CipherType::Aes128Ctr => 16,
            CipherType::Aes256Ctr => 32,
        }
    }

    /// Returns the size of in bytes of the IV expected by the cipher.
    pub const fn iv_size(self) -> usize {
        match self {
            CipherType::Aes128Ctr | CipherType::Aes256Ctr => 16,
        }
    }
}
