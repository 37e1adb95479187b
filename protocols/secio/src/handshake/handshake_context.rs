//! Typestate of the handshake: each step consumes the previous context and
//! returns one holding strictly more knowledge about the remote.

use crate::crypto::cipher::CipherType;
use crate::error::SecioError;
use crate::exchange::{EphemeralPrivateKey, KeyAgreement};
use crate::handshake_proto::Propose;
use crate::{support, Config, Digest};

use log::{debug, trace};
use meshlink_core::PublicKey;
use prost::Message;
use sha2::{Digest as _, Sha256};
use std::cmp::Ordering;

pub(crate) struct HandshakeContext<T> {
    pub(crate) config: Config,
    pub(crate) state: T,
}

/// Prototype state: nothing sent, nothing received.
pub(crate) struct Empty;

/// Local-only state: our proposition is ready to hit the wire.
pub(crate) struct Local {
    /// Our 16-byte nonce from the proposition.
    pub(crate) nonce: [u8; 16],
    /// Our local proposition's raw bytes, as signed later.
    pub(crate) proposition_bytes: Vec<u8>,
    /// Our protobuf-encoded public key.
    public_key_encoded: Vec<u8>,
}

/// The remote's proposition arrived and the algorithms are chosen.
pub(crate) struct Remote {
    pub(crate) local: Local,
    /// The remote proposition's raw bytes, as verified later.
    pub(crate) proposition_bytes: Vec<u8>,
    /// The remote's identity key.
    pub(crate) public_key: PublicKey,
    /// The remote's nonce.
    pub(crate) nonce: Vec<u8>,
    /// Ordering of our propose-hash vs. the remote's; decides whose
    /// preference lists win and which stretched key half is ours.
    pub(crate) hashes_ordering: Ordering,
    pub(crate) chosen_exchange: KeyAgreement,
    pub(crate) chosen_cipher: CipherType,
    pub(crate) chosen_hash: Digest,
}

/// An ephemeral key pair has been generated.
pub(crate) struct Ephemeral {
    pub(crate) remote: Remote,
    pub(crate) local_tmp_priv_key: EphemeralPrivateKey,
    pub(crate) local_tmp_pub_key: Vec<u8>,
}

/// Like `Ephemeral`, but the private key has been taken out for the ECDH.
pub(crate) struct PubEphemeral {
    pub(crate) remote: Remote,
    pub(crate) local_tmp_pub_key: Vec<u8>,
}

impl HandshakeContext<Empty> {
    pub(crate) fn new(config: Config) -> Self {
        HandshakeContext {
            config,
            state: Empty,
        }
    }

    /// Setup local proposition.
    pub(crate) fn with_local(self) -> HandshakeContext<Local> {
        let mut nonce = [0u8; 16];
        rand::Rng::fill(&mut rand::thread_rng(), &mut nonce[..]);

        let public_key_encoded = self.config.key.public().into_protobuf_encoding();

        let propose = Propose {
            rand: Some(nonce.to_vec()),
            pubkey: Some(public_key_encoded.clone()),
            exchanges: Some(
                self.config
                    .agreements_proposal
                    .clone()
                    .unwrap_or_else(|| support::DEFAULT_AGREEMENTS_PROPOSITION.into()),
            ),
            ciphers: Some(
                self.config
                    .ciphers_proposal
                    .clone()
                    .unwrap_or_else(|| support::DEFAULT_CIPHERS_PROPOSITION.into()),
            ),
            hashes: Some(
                self.config
                    .digests_proposal
                    .clone()
                    .unwrap_or_else(|| support::DEFAULT_DIGESTS_PROPOSITION.into()),
            ),
        };
        let mut proposition_bytes = Vec::with_capacity(propose.encoded_len());
        propose
            .encode(&mut proposition_bytes)
            .expect("Vec<u8> provides capacity as needed");

        HandshakeContext {
            config: self.config,
            state: Local {
                nonce,
                proposition_bytes,
                public_key_encoded,
            },
        }
    }
}

impl HandshakeContext<Local> {
    /// Process the remote's proposition.
    pub(crate) fn with_remote(
        self,
        remote_bytes: Vec<u8>,
    ) -> Result<HandshakeContext<Remote>, SecioError> {
        let propose = match Propose::decode(&remote_bytes[..]) {
            Ok(p) => p,
            Err(_) => {
                debug!("failed to parse remote's proposition protobuf message");
                return Err(SecioError::HandshakeParsingFailure);
            }
        };

        let nonce = propose.rand.unwrap_or_default();
        let pubkey_encoded = propose.pubkey.unwrap_or_default();
        let exchanges = propose.exchanges.unwrap_or_default();
        let ciphers = propose.ciphers.unwrap_or_default();
        let hashes = propose.hashes.unwrap_or_default();

        let public_key = match PublicKey::from_protobuf_encoding(&pubkey_encoded) {
            Ok(p) => p,
            Err(_) => {
                debug!("failed to parse remote's proposition's pubkey protobuf");
                return Err(SecioError::InvalidRemotePubKey);
            }
        };

        // In order to determine which protocols to use, we compute two hashes
        // and choose based on which hash is larger.
        let hashes_ordering = {
            let oh1 = {
                let mut ctx = Sha256::new();
                ctx.update(&pubkey_encoded);
                ctx.update(&self.state.nonce);
                ctx.finalize()
            };
            let oh2 = {
                let mut ctx = Sha256::new();
                ctx.update(&self.state.public_key_encoded);
                ctx.update(&nonce);
                ctx.finalize()
            };
            oh1.as_slice().cmp(oh2.as_slice())
        };

        let chosen_exchange = {
            let ours = self
                .config
                .agreements_proposal
                .clone()
                .unwrap_or_else(|| support::DEFAULT_AGREEMENTS_PROPOSITION.into());
            support::select_agreement(hashes_ordering, &ours, &exchanges)?
        };
        let chosen_cipher = {
            let ours = self
                .config
                .ciphers_proposal
                .clone()
                .unwrap_or_else(|| support::DEFAULT_CIPHERS_PROPOSITION.into());
            let c = support::select_cipher(hashes_ordering, &ours, &ciphers)?;
            trace!("selected cipher: {:?}", c);
            c
        };
        let chosen_hash = {
            let ours = self
                .config
                .digests_proposal
                .clone()
                .unwrap_or_else(|| support::DEFAULT_DIGESTS_PROPOSITION.into());
            let h = support::select_digest(hashes_ordering, &ours, &hashes)?;
            trace!("selected hash: {:?}", h);
            h
        };

        Ok(HandshakeContext {
            config: self.config,
            state: Remote {
                local: self.state,
                proposition_bytes: remote_bytes,
                public_key,
                nonce,
                hashes_ordering,
                chosen_exchange,
                chosen_cipher,
                chosen_hash,
            },
        })
    }
}

impl HandshakeContext<Remote> {
    pub(crate) fn with_ephemeral(
        self,
        tmp_priv: EphemeralPrivateKey,
        tmp_pub: Vec<u8>,
    ) -> HandshakeContext<Ephemeral> {
        HandshakeContext {
            config: self.config,
            state: Ephemeral {
                remote: self.state,
                local_tmp_priv_key: tmp_priv,
                local_tmp_pub_key: tmp_pub,
            },
        }
    }
}

impl HandshakeContext<Ephemeral> {
    pub(crate) fn take_private_key(
        self,
    ) -> (HandshakeContext<PubEphemeral>, EphemeralPrivateKey) {
        let context = HandshakeContext {
            config: self.config,
            state: PubEphemeral {
                remote: self.state.remote,
                local_tmp_pub_key: self.state.local_tmp_pub_key,
            },
        };
        (context, self.state.local_tmp_priv_key)
    }
}
