use crate::PublicKey;
use multihash::{Code, Multihash, Sha2_256};
use std::{convert::TryFrom, fmt, str::FromStr};

/// Identifier of a peer of the network.
///
/// The data is a SHA-256 multihash of the protobuf-encoded public key of the
/// peer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerId {
    multihash: Multihash,
}

impl PeerId {
    /// Builds a `PeerId` from a public key.
    pub fn from_public_key(key: PublicKey) -> PeerId {
        let key_enc = key.into_protobuf_encoding();
        let multihash = Sha2_256::digest(&key_enc);
        PeerId { multihash }
    }

    /// Checks whether `data` is a valid `PeerId`. If so, returns the `PeerId`.
    /// If not, returns back the data as an error.
    pub fn from_bytes(data: Vec<u8>) -> Result<PeerId, Vec<u8>> {
        match Multihash::from_bytes(data) {
            Ok(multihash) if multihash.algorithm() == Code::Sha2_256 => Ok(PeerId { multihash }),
            Ok(multihash) => Err(multihash.into_bytes()),
            Err(err) => Err(err.data),
        }
    }

    /// Generates a random peer ID. Useful for testing.
    pub fn random() -> PeerId {
        let digest = rand::random::<[u8; 32]>();
        PeerId {
            multihash: Sha2_256::digest(&digest),
        }
    }

    /// Returns a raw byte representation of this `PeerId`.
    pub fn as_bytes(&self) -> &[u8] {
        self.multihash.as_bytes()
    }

    /// Returns a base-58 encoded string of this `PeerId`.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.as_bytes()).into_string()
    }

    /// Checks whether the public key passed as parameter matches the public
    /// key of this `PeerId`.
    pub fn is_public_key(&self, public_key: &PublicKey) -> bool {
        let other = PeerId::from_public_key(public_key.clone());
        *self == other
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("PeerId").field(&self.to_base58()).finish()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.to_base58().fmt(f)
    }
}

impl From<PublicKey> for PeerId {
    fn from(key: PublicKey) -> PeerId {
        PeerId::from_public_key(key)
    }
}

impl TryFrom<Vec<u8>> for PeerId {
    type Error = Vec<u8>;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        PeerId::from_bytes(value)
    }
}

impl FromStr for PeerId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s).into_vec().map_err(|_| ParseError)?;
        PeerId::from_bytes(bytes).map_err(|_| ParseError)
    }
}

/// Error when turning a string into a `PeerId`.
#[derive(Debug, Clone, Copy)]
pub struct ParseError;

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid peer id")
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;

    #[test]
    fn peer_id_is_public_key() {
        let key = Keypair::generate_ed25519().public();
        let peer_id = key.clone().into_peer_id();
        assert!(peer_id.is_public_key(&key));
    }

    #[test]
    fn base58_round_trip() {
        let peer_id = Keypair::generate_ed25519().public().into_peer_id();
        let other: PeerId = peer_id.to_base58().parse().unwrap();
        assert_eq!(peer_id, other);
    }

    #[test]
    fn random_peer_ids_differ() {
        assert_ne!(PeerId::random(), PeerId::random());
    }
}
