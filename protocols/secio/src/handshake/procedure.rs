use log::{debug, trace};
use std::cmp::Ordering;

use crate::{
    codec::{len_prefix::LengthPrefixSocket, secure_stream::SecureStream, Hmac},
    crypto::{new_stream, CryptoMode},
    error::SecioError,
    exchange,
    handshake::handshake_context::HandshakeContext,
    handshake_proto::Exchange,
    Config, EphemeralPublicKey,
};

use meshlink_core::PublicKey;
use meshlink_traits::{SplitEx, SplittableReadWrite, WriteEx};
use prost::Message;
use zeroize::Zeroize;

/// Performs a handshake on the given socket.
///
/// Both sides must be run with the same protocol parameters; any mismatch or
/// tampering somewhere will produce a `SecioError`.
///
/// On success, returns the encrypted stream, the public key of the remote,
/// and the ephemeral public key used during the negotiation.
pub(crate) async fn handshake<T>(
    socket: T,
    config: Config,
) -> Result<(SecureStream<T::Reader, T::Writer>, PublicKey, EphemeralPublicKey), SecioError>
where
    T: SplittableReadWrite,
{
    let max_frame_len = config.max_frame_length;

    // The handshake messages all start with a 4-byte big-endian length prefix.
    let mut socket = LengthPrefixSocket::new(socket, max_frame_len);

    // Generate our nonce and proposition.
    let local_context = HandshakeContext::new(config).with_local();
    trace!(
        "starting handshake; local nonce = {:?}",
        local_context.state.nonce
    );

    trace!("sending proposition to remote");
    socket
        .send_frame(&local_context.state.proposition_bytes)
        .await?;

    // Receive the remote's proposition.
    let remote_proposition = socket.recv_frame().await?;
    let remote_context = local_context.with_remote(remote_proposition)?;

    trace!(
        "received proposition from remote; nonce = {:?}",
        remote_context.state.nonce
    );

    // Generate an ephemeral key for the negotiation.
    let (tmp_priv_key, tmp_pub_key) =
        exchange::generate_agreement(remote_context.state.chosen_exchange)?;

    // Send the ephemeral pub key to the remote in an `Exchange` struct. The
    // `Exchange` also contains a signature of the two propositions encoded
    // with our static public key.
    let ephemeral_context = remote_context.with_ephemeral(tmp_priv_key, tmp_pub_key.clone());

    let local_exchange = {
        let mut data_to_sign = ephemeral_context
            .state
            .remote
            .local
            .proposition_bytes
            .clone();
        data_to_sign.extend_from_slice(&ephemeral_context.state.remote.proposition_bytes);
        data_to_sign.extend_from_slice(&tmp_pub_key);

        let signature = match ephemeral_context.config.key.sign(&data_to_sign) {
            Ok(signature) => signature,
            Err(_) => return Err(SecioError::HandshakeParsingFailure),
        };

        Exchange {
            epubkey: Some(tmp_pub_key.clone()),
            signature: Some(signature),
        }
    };
    let local_exchange_bytes = {
        let mut buf = Vec::with_capacity(local_exchange.encoded_len());
        local_exchange
            .encode(&mut buf)
            .expect("Vec<u8> provides capacity as needed");
        buf
    };

    trace!("sending exchange to remote");
    socket.send_frame(&local_exchange_bytes).await?;

    // Receive the remote's `Exchange`.
    let remote_exchange = {
        let raw = socket.recv_frame().await?;
        match Exchange::decode(&raw[..]) {
            Ok(e) => e,
            Err(err) => {
                debug!("failed to parse remote's exchange protobuf; {:?}", err);
                return Err(SecioError::HandshakeParsingFailure);
            }
        }
    };
    let remote_ephemeral = remote_exchange.epubkey.unwrap_or_default();
    let remote_signature = remote_exchange.signature.unwrap_or_default();

    trace!("received and decoded the remote's exchange");

    // Check the validity of the remote's `Exchange`. This verifies that the
    // remote was really the sender of its proposition, and that it is the
    // owner of both its global and ephemeral keys.
    let mut data_to_verify = ephemeral_context.state.remote.proposition_bytes.clone();
    data_to_verify.extend_from_slice(&ephemeral_context.state.remote.local.proposition_bytes);
    data_to_verify.extend_from_slice(&remote_ephemeral);

    if !ephemeral_context
        .state
        .remote
        .public_key
        .verify(&data_to_verify, &remote_signature)
    {
        debug!("failed to verify the remote's signature");
        return Err(SecioError::SignatureVerificationFailed);
    }

    trace!("successfully verified the remote's signature");

    // Generate a key from the local ephemeral private key and the remote
    // ephemeral public key, derive from it a cipher key, an iv, and a hmac
    // key, and build the encoder/decoder.
    let (pub_ephemeral_context, local_priv_key) = ephemeral_context.take_private_key();
    let mut key_material = exchange::agree(
        pub_ephemeral_context.state.remote.chosen_exchange,
        local_priv_key,
        &remote_ephemeral,
    )?;

    let chosen_cipher = pub_ephemeral_context.state.remote.chosen_cipher;
    let chosen_hash = pub_ephemeral_context.state.remote.chosen_hash;
    let cipher_key_size = chosen_cipher.key_size();
    let iv_size = chosen_cipher.iv_size();

    let kdf = Hmac::from_key(chosen_hash, &key_material);
    let mut longer_key = vec![0u8; 2 * (iv_size + cipher_key_size + 20)];
    stretch_key(kdf, &mut longer_key);
    key_material.zeroize();

    let (encode_cipher, encode_hmac, decode_cipher, decode_hmac) = {
        let (first_half, second_half) = longer_key.split_at(longer_key.len() / 2);
        let (local_infos, remote_infos) = match pub_ephemeral_context.state.remote.hashes_ordering {
            Ordering::Equal => {
                // same propose hash on both sides: we are talking to ourselves
                return Err(SecioError::SelfConnecting);
            }
            Ordering::Less => (second_half, first_half),
            Ordering::Greater => (first_half, second_half),
        };

        let (encode_cipher, encode_hmac) = generate_stream_cipher_and_hmac(
            chosen_cipher,
            chosen_hash,
            CryptoMode::Encrypt,
            local_infos,
            cipher_key_size,
            iv_size,
        );
        let (decode_cipher, decode_hmac) = generate_stream_cipher_and_hmac(
            chosen_cipher,
            chosen_hash,
            CryptoMode::Decrypt,
            remote_infos,
            cipher_key_size,
            iv_size,
        );
        (encode_cipher, encode_hmac, decode_cipher, decode_hmac)
    };
    longer_key.zeroize();

    let (reader, writer) = socket.into_inner().split();
    let mut secure_stream = SecureStream::new(
        reader,
        writer,
        max_frame_len,
        decode_cipher,
        decode_hmac,
        encode_cipher,
        encode_hmac,
        pub_ephemeral_context.state.remote.local.nonce.to_vec(),
    );

    // We send back their nonce to check if the connection works.
    trace!("checking encryption by sending back remote's nonce");
    secure_stream
        .write2(&pub_ephemeral_context.state.remote.nonce)
        .await?;
    secure_stream.flush2().await?;
    secure_stream.verify_nonce().await?;

    Ok((
        secure_stream,
        pub_ephemeral_context.state.remote.public_key,
        pub_ephemeral_context.state.local_tmp_pub_key,
    ))
}

/// Custom algorithm translated from reference implementations. Needs to be
/// the same algorithm amongst all implementations.
fn stretch_key(hmac: Hmac, result: &mut [u8]) {
    const SEED: &[u8] = b"key expansion";

    let mut init_ctxt = hmac.context();
    init_ctxt.update(SEED);
    let mut a = init_ctxt.sign();

    let mut j = 0;
    while j < result.len() {
        let mut context = hmac.context();
        context.update(&a);
        context.update(SEED);
        let b = context.sign();

        let todo = ::std::cmp::min(b.len(), result.len() - j);
        result[j..j + todo].copy_from_slice(&b[..todo]);
        j += todo;

        let mut context = hmac.context();
        context.update(&a);
        a = context.sign();
    }
}

fn generate_stream_cipher_and_hmac(
    t: crate::crypto::cipher::CipherType,
    digest: crate::Digest,
    mode: CryptoMode,
    info: &[u8],
    key_size: usize,
    iv_size: usize,
) -> (crate::crypto::BoxStreamCipher, Hmac) {
    let (iv, rest) = info.split_at(iv_size);
    let (cipher_key, mac_key) = rest.split_at(key_size);
    let hmac = Hmac::from_key(digest, mac_key);
    let cipher = new_stream(t, cipher_key, iv, mode);
    (cipher, hmac)
}
