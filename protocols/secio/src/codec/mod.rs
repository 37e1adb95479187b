//! Encryption and MAC codec of the secured channel.

pub mod len_prefix;
pub mod secure_stream;

use crate::Digest;
use hmac::Mac;
use sha2::{Sha256, Sha512};

type HmacSha256 = hmac::Hmac<Sha256>;
type HmacSha512 = hmac::Hmac<Sha512>;

/// Message authentication code keyed during the handshake.
///
/// Signing clones the keyed state, so one instance serves a whole channel
/// direction.
#[derive(Clone)]
pub enum Hmac {
    Sha256(HmacSha256),
    Sha512(HmacSha512),
}

impl Hmac {
    /// Returns the size of the hash in bytes.
    pub fn num_bytes(&self) -> usize {
        match self {
            Hmac::Sha256(_) => 32,
            Hmac::Sha512(_) => 64,
        }
    }

    /// Builds a `Hmac` from an algorithm and key.
    pub fn from_key(algorithm: Digest, key: &[u8]) -> Self {
        match algorithm {
            Digest::Sha256 => Hmac::Sha256(
                HmacSha256::new_from_slice(key).expect("HMAC accepts any key length"),
            ),
            Digest::Sha512 => Hmac::Sha512(
                HmacSha512::new_from_slice(key).expect("HMAC accepts any key length"),
            ),
        }
    }

    /// Starts a fresh signing context keyed like this instance.
    pub fn context(&self) -> HmacContext {
        HmacContext(self.clone())
    }

    /// Signs the data in one go.
    pub fn sign(&self, crypted_data: &[u8]) -> Vec<u8> {
        let mut ctx = self.context();
        ctx.update(crypted_data);
        ctx.sign()
    }

    /// Verifies that the data matches the expected hash, in constant time.
    pub fn verify(&self, crypted_data: &[u8], expected_hash: &[u8]) -> bool {
        match self.clone() {
            Hmac::Sha256(mut hmac) => {
                hmac.update(crypted_data);
                hmac.verify_slice(expected_hash).is_ok()
            }
            Hmac::Sha512(mut hmac) => {
                hmac.update(crypted_data);
                hmac.verify_slice(expected_hash).is_ok()
            }
        }
    }
}

/// An in-progress HMAC computation.
pub struct HmacContext(Hmac);

impl HmacContext {
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.0 {
            Hmac::Sha256(hmac) => Mac::update(hmac, data),
            Hmac::Sha512(hmac) => Mac::update(hmac, data),
        }
    }

    pub fn sign(self) -> Vec<u8> {
        match self.0 {
            Hmac::Sha256(hmac) => hmac.finalize().into_bytes().to_vec(),
            Hmac::Sha512(hmac) => hmac.finalize().into_bytes().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let hmac = Hmac::from_key(Digest::Sha256, b"some key");
        let sig = hmac.sign(b"hello");
        assert_eq!(sig.len(), hmac.num_bytes());
        assert!(hmac.verify(b"hello", &sig));
        assert!(!hmac.verify(b"hellp", &sig));

        let other = Hmac::from_key(Digest::Sha256, b"other key");
        assert!(!other.verify(b"hello", &sig));
    }

    #[test]
    fn context_matches_one_shot() {
        let hmac = Hmac::from_key(Digest::Sha512, b"k");
        let mut ctx = hmac.context();
        ctx.update(b"he");
        ctx.update(b"llo");
        assert_eq!(ctx.sign(), hmac.sign(b"hello"));
    }
}
