//! Ephemeral key generation and ECDH agreement for the handshake.

use crate::error::SecioError;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;

/// Possible key agreement algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAgreement {
    EcdhP256,
    EcdhP384,
}

/// An ephemeral private key, dropped as soon as the shared secret is derived.
pub enum EphemeralPrivateKey {
    P256(p256::ecdh::EphemeralSecret),
    P384(p384::ecdh::EphemeralSecret),
}

/// Generates a new key pair of the given algorithm as part of the exchange.
///
/// Returns the opaque private key and the corresponding public key encoded as
/// an uncompressed SEC1 point, the form it takes on the wire.
pub fn generate_agreement(
    alg: KeyAgreement,
) -> Result<(EphemeralPrivateKey, Vec<u8>), SecioError> {
    match alg {
        KeyAgreement::EcdhP256 => {
            let private = p256::ecdh::EphemeralSecret::random(&mut OsRng);
            let public = private.public_key().to_encoded_point(false).as_bytes().to_vec();
            Ok((EphemeralPrivateKey::P256(private), public))
        }
        KeyAgreement::EcdhP384 => {
            let private = p384::ecdh::EphemeralSecret::random(&mut OsRng);
            let public = private.public_key().to_encoded_point(false).as_bytes().to_vec();
            Ok((EphemeralPrivateKey::P384(private), public))
        }
    }
}

/// Finishes the agreement: combines our ephemeral private key with the
/// remote's ephemeral public key.
///
/// The shared secret is the affine X coordinate of the resulting point,
/// which is what every implementation feeds into the key stretch.
pub fn agree(
    alg: KeyAgreement,
    my_private_key: EphemeralPrivateKey,
    other_public_key: &[u8],
) -> Result<Vec<u8>, SecioError> {
    match (alg, my_private_key) {
        (KeyAgreement::EcdhP256, EphemeralPrivateKey::P256(private)) => {
            let remote = p256::PublicKey::from_sec1_bytes(other_public_key)
                .map_err(|_| SecioError::SecretGenerationFailed)?;
            Ok(private.diffie_hellman(&remote).raw_secret_bytes().to_vec())
        }
        (KeyAgreement::EcdhP384, EphemeralPrivateKey::P384(private)) => {
            let remote = p384::PublicKey::from_sec1_bytes(other_public_key)
                .map_err(|_| SecioError::SecretGenerationFailed)?;
            Ok(private.diffie_hellman(&remote).raw_secret_bytes().to_vec())
        }
        _ => Err(SecioError::SecretGenerationFailed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agreement_works(alg: KeyAgreement) {
        let (a_priv, a_pub) = generate_agreement(alg).unwrap();
        let (b_priv, b_pub) = generate_agreement(alg).unwrap();
        let a_shared = agree(alg, a_priv, &b_pub).unwrap();
        let b_shared = agree(alg, b_priv, &a_pub).unwrap();
        assert_eq!(a_shared, b_shared);
        assert!(!a_shared.is_empty());
    }

    #[test]
    fn agreement_p256() {
        agreement_works(KeyAgreement::EcdhP256);
    }

    #[test]
    fn agreement_p384() {
        agreement_works(KeyAgreement::EcdhP384);
    }

    #[test]
    fn garbage_public_key_is_rejected() {
        let (a_priv, _) = generate_agreement(KeyAgreement::EcdhP256).unwrap();
        assert!(agree(KeyAgreement::EcdhP256, a_priv, b"not a point").is_err());
    }
}
