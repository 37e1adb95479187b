//! Node identity keys.
//!
//! A node authenticates itself with an Ed25519 keypair; the protobuf-encoded
//! public key is what travels in the SECIO and Noise handshakes and what the
//! [`crate::PeerId`] is derived from.

pub mod ed25519;

use crate::keys_proto;
use crate::PeerId;
use prost::Message;
use std::{error, fmt};

/// Identity keypair of a node.
#[derive(Clone)]
pub enum Keypair {
    /// An Ed25519 keypair.
    Ed25519(ed25519::Keypair),
}

impl Keypair {
    /// Generate a new Ed25519 keypair.
    pub fn generate_ed25519() -> Keypair {
        Keypair::Ed25519(ed25519::Keypair::generate())
    }

    /// Sign a message using the private key of this keypair, producing
    /// a signature that can be verified using the corresponding public key.
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, SigningError> {
        match self {
            Keypair::Ed25519(pair) => Ok(pair.sign(msg)),
        }
    }

    /// Get the public key of this keypair.
    pub fn public(&self) -> PublicKey {
        match self {
            Keypair::Ed25519(pair) => PublicKey::Ed25519(pair.public()),
        }
    }
}

/// The public key of a node's identity keypair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKey {
    /// A public Ed25519 key.
    Ed25519(ed25519::PublicKey),
}

impl PublicKey {
    /// Verify a signature for a message using this public key, i.e. check
    /// that the signature has been produced by the corresponding private key.
    pub fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        match self {
            PublicKey::Ed25519(pk) => pk.verify(msg, sig),
        }
    }

    /// Encode the public key into a protobuf structure for transmission on
    /// the wire.
    pub fn into_protobuf_encoding(self) -> Vec<u8> {
        let public_key = match self {
            PublicKey::Ed25519(key) => keys_proto::PublicKey {
                r#type: keys_proto::KeyType::Ed25519 as i32,
                data: key.encode().to_vec(),
            },
        };
        let mut buf = Vec::with_capacity(public_key.encoded_len());
        public_key.encode(&mut buf).expect("Vec<u8> provides capacity as needed");
        buf
    }

    /// Decode a public key from a protobuf structure, e.g. read from the wire.
    pub fn from_protobuf_encoding(bytes: &[u8]) -> Result<PublicKey, DecodingError> {
        let pubkey = keys_proto::PublicKey::decode(bytes).map_err(|_| DecodingError::BadProtobuf)?;
        match keys_proto::KeyType::from_i32(pubkey.r#type) {
            Some(keys_proto::KeyType::Ed25519) => {
                ed25519::PublicKey::decode(&pubkey.data).map(PublicKey::Ed25519)
            }
            Some(_) => Err(DecodingError::UnsupportedKeyType(pubkey.r#type)),
            None => Err(DecodingError::UnsupportedKeyType(pubkey.r#type)),
        }
    }

    /// Obtain the `PeerId` of the node carrying this key.
    pub fn into_peer_id(self) -> PeerId {
        self.into()
    }
}

/// An error during signing of a message.
#[derive(Debug)]
pub struct SigningError(pub(crate) &'static str);

impl fmt::Display for SigningError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "key signing error: {}", self.0)
    }
}

impl error::Error for SigningError {}

/// An error during decoding of key material.
#[derive(Debug)]
pub enum DecodingError {
    BadProtobuf,
    InvalidKeyBytes,
    UnsupportedKeyType(i32),
}

impl fmt::Display for DecodingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodingError::BadProtobuf => f.write_str("malformed public key protobuf"),
            DecodingError::InvalidKeyBytes => f.write_str("invalid key bytes"),
            DecodingError::UnsupportedKeyType(t) => write!(f, "unsupported key type: {}", t),
        }
    }
}

impl error::Error for DecodingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let pair = Keypair::generate_ed25519();
        let msg = b"reach for the stars";
        let sig = pair.sign(msg).unwrap();
        assert!(pair.public().verify(msg, &sig));
        assert!(!pair.public().verify(b"reach for the moon", &sig));

        let other = Keypair::generate_ed25519();
        assert!(!other.public().verify(msg, &sig));
    }

    #[test]
    fn protobuf_round_trip() {
        let public = Keypair::generate_ed25519().public();
        let encoded = public.clone().into_protobuf_encoding();
        let decoded = PublicKey::from_protobuf_encoding(&encoded).unwrap();
        assert_eq!(public, decoded);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(PublicKey::from_protobuf_encoding(b"not a protobuf").is_err());
    }
}
