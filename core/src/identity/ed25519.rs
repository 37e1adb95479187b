//! Ed25519 keys.

use super::DecodingError;
use ed25519_dalek::{Signer, Verifier};
use rand::rngs::OsRng;
use std::fmt;

/// An Ed25519 keypair.
pub struct Keypair(ed25519_dalek::Keypair);

impl Keypair {
    /// Generate a new Ed25519 keypair.
    pub fn generate() -> Keypair {
        let mut csprng = OsRng {};
        Keypair(ed25519_dalek::Keypair::generate(&mut csprng))
    }

    /// Encode the keypair into a byte array by concatenating the bytes
    /// of the secret scalar and the compressed public point.
    pub fn encode(&self) -> [u8; 64] {
        self.0.to_bytes()
    }

    /// Decode a keypair from the format produced by `encode`.
    pub fn decode(kp: &[u8]) -> Result<Keypair, DecodingError> {
        ed25519_dalek::Keypair::from_bytes(kp)
            .map(Keypair)
            .map_err(|_| DecodingError::InvalidKeyBytes)
    }

    /// Sign a message using the private key of this keypair.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        self.0.sign(msg).to_bytes().to_vec()
    }

    /// Get the public key of this keypair.
    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.public)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Keypair").field("public", &self.0.public).finish()
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Keypair {
        let bytes = self.0.to_bytes();
        Keypair(ed25519_dalek::Keypair::from_bytes(&bytes).expect("same bytes are a valid keypair"))
    }
}

/// An Ed25519 public key.
#[derive(PartialEq, Eq, Clone)]
pub struct PublicKey(ed25519_dalek::PublicKey);

impl PublicKey {
    /// Verify the Ed25519 signature on a message using the public key.
    pub fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        ed25519_dalek::Signature::from_bytes(sig)
            .and_then(|s| self.0.verify(msg, &s))
            .is_ok()
    }

    /// Encode the public key into a compressed point byte array.
    pub fn encode(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Decode a public key from a compressed point byte array.
    pub fn decode(k: &[u8]) -> Result<PublicKey, DecodingError> {
        ed25519_dalek::PublicKey::from_bytes(k)
            .map(PublicKey)
            .map_err(|_| DecodingError::InvalidKeyBytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PublicKey(ed25519): ")?;
        for byte in self.encode().iter() {
            write!(f, "{:x}", byte)?;
        }
        Ok(())
    }
}
