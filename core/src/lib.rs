//! Transports, upgrades, multiplexing and identity handling of *meshlink*.
//!
//! The main concepts of meshlink-core are:
//!
//! - A [`PeerId`] is a unique global identifier for a node on the network.
//!   Each node must have a different `PeerId`. Normally, a `PeerId` is the
//!   hash of the public key used to negotiate encryption on the
//!   communication channel, thereby guaranteeing that they cannot be spoofed.
//! - The [`Transport`] trait abstracts a duplex byte pipe with dial/accept;
//!   [`transport::TransportUpgrade`] layers multistream-select, a secure
//!   channel and a stream muxer on top of any such pipe.
//! - The [`multistream::Negotiator`] agrees on a protocol name over any
//!   freshly opened stream.

mod keys_proto;

pub mod either;
pub mod identity;
pub mod multistream;
pub mod muxing;
mod peer_id;
pub mod ping;
pub mod secure_io;
pub mod transport;
pub mod upgrade;
pub mod varint;

pub use identity::{Keypair, PublicKey};
pub use meshlink_multiaddr::Multiaddr;
pub use peer_id::PeerId;
pub use transport::{Transport, TransportError, TransportListener};
