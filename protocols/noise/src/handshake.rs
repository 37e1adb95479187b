//! The three-message `Noise_XX_25519_ChaChaPoly_SHA256` handshake, with the
//! libp2p identity payload carried in messages 2 and 3.

use crate::error::NoiseError;
use crate::framed::NoiseFramed;
use crate::payload_proto::NoiseHandshakePayload;

use log::trace;
use meshlink_core::identity::Keypair;
use meshlink_core::PublicKey;
use meshlink_traits::{ReadEx, WriteEx};
use prost::Message;
use snow::StatelessTransportState;
use std::sync::Arc;

/// The identity key signs the static Noise key under this domain prefix.
const STATIC_KEY_SIGNING_PREFIX: &[u8] = b"noise-libp2p-static-key:";

pub(crate) fn noise_params() -> snow::params::NoiseParams {
    "Noise_XX_25519_ChaChaPoly_SHA256"
        .parse()
        .expect("valid hard-coded pattern string")
}

/// Builds the payload announcing (and proving ownership of) our identity.
fn make_payload(identity: &Keypair, noise_static_pub: &[u8]) -> Result<Vec<u8>, NoiseError> {
    let mut to_sign = STATIC_KEY_SIGNING_PREFIX.to_vec();
    to_sign.extend_from_slice(noise_static_pub);
    let signature = identity
        .sign(&to_sign)
        .map_err(|_| NoiseError::InvalidPayload)?;

    let payload = NoiseHandshakePayload {
        libp2p_key: identity.public().into_protobuf_encoding(),
        noise_static_key_signature: signature,
        libp2p_data: Vec::new(),
        libp2p_data_signature: Vec::new(),
    };
    let mut buf = Vec::with_capacity(payload.encoded_len());
    payload.encode(&mut buf).expect("Vec<u8> provides capacity as needed");
    Ok(buf)
}

/// Checks a received payload against the remote's static Noise key and
/// extracts the authenticated identity key.
pub(crate) fn verify_payload(
    payload: &[u8],
    remote_noise_static: &[u8],
) -> Result<PublicKey, NoiseError> {
    let payload =
        NoiseHandshakePayload::decode(payload).map_err(|_| NoiseError::InvalidPayload)?;
    let identity = PublicKey::from_protobuf_encoding(&payload.libp2p_key)
        .map_err(|_| NoiseError::InvalidPayload)?;

    let mut signed = STATIC_KEY_SIGNING_PREFIX.to_vec();
    signed.extend_from_slice(remote_noise_static);
    if !identity.verify(&signed, &payload.noise_static_key_signature) {
        return Err(NoiseError::SignatureVerificationFailed);
    }
    Ok(identity)
}

/// Runs the XX handshake on `io`.
///
/// Returns the socket, the transport cipher states and the remote's
/// authenticated identity key.
pub(crate) async fn handshake<T>(
    io: T,
    identity: Keypair,
    initiator: bool,
) -> Result<(T, Arc<StatelessTransportState>, PublicKey), NoiseError>
where
    T: ReadEx + WriteEx + Unpin,
{
    let builder = snow::Builder::new(noise_params());
    let noise_keys = builder.generate_keypair()?;
    let builder = builder.local_private_key(&noise_keys.private);
    let session = if initiator {
        builder.build_initiator()?
    } else {
        builder.build_responder()?
    };
    let payload = make_payload(&identity, &noise_keys.public)?;

    let mut framed = NoiseFramed::new(io, session);

    // One slot: the XX pattern delivers exactly one payload to each side.
    let instance_payload;

    if initiator {
        trace!("noise: -> e");
        framed.send(&[]).await?;
        trace!("noise: <- e, ee, s, es");
        instance_payload = framed.recv().await?;
        trace!("noise: -> s, se");
        framed.send(&payload).await?;
    } else {
        trace!("noise: <- e");
        let first = framed.recv().await?;
        if !first.is_empty() {
            return Err(NoiseError::UnexpectedPayload);
        }
        trace!("noise: -> e, ee, s, es");
        framed.send(&payload).await?;
        trace!("noise: <- s, se");
        instance_payload = framed.recv().await?;
    }

    let (io, state, remote_static) = framed.into_stateless()?;
    let remote_identity = verify_payload(&instance_payload, &remote_static)?;
    trace!("noise handshake complete");

    Ok((io, state, remote_identity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trip() {
        let identity = Keypair::generate_ed25519();
        let noise_static = [42u8; 32];
        let payload = make_payload(&identity, &noise_static).unwrap();
        let verified = verify_payload(&payload, &noise_static).unwrap();
        assert_eq!(verified, identity.public());
    }

    #[test]
    fn payload_bound_to_static_key() {
        let identity = Keypair::generate_ed25519();
        let payload = make_payload(&identity, &[42u8; 32]).unwrap();
        // verifying against a different static key must fail
        assert!(matches!(
            verify_payload(&payload, &[43u8; 32]),
            Err(NoiseError::SignatureVerificationFailed)
        ));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let identity = Keypair::generate_ed25519();
        let noise_static = [42u8; 32];
        let payload = make_payload(&identity, &noise_static).unwrap();

        let mut decoded = NoiseHandshakePayload::decode(&payload[..]).unwrap();
        let last = decoded.noise_static_key_signature.len() - 1;
        decoded.noise_static_key_signature[last] ^= 0x01;
        let mut tampered = Vec::new();
        decoded.encode(&mut tampered).unwrap();

        assert!(matches!(
            verify_payload(&tampered, &noise_static),
            Err(NoiseError::SignatureVerificationFailed)
        ));
    }
}
