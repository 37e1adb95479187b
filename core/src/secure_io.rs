use crate::identity::Keypair;
use crate::{PeerId, PublicKey};

/// Information exposed by a secure channel once its handshake completed.
pub trait SecureInfo {
    /// The peer on our side of the channel.
    fn local_peer(&self) -> PeerId;

    /// The authenticated peer on the remote side.
    fn remote_peer(&self) -> PeerId;

    /// The private key of the local node.
    fn local_priv_key(&self) -> Keypair;

    /// The public key the remote proved ownership of.
    fn remote_pub_key(&self) -> PublicKey;
}
