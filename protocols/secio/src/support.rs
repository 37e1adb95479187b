//! Supported algorithms and the proposition matching rules.
//!
//! Preference lists travel as comma-separated strings; iteration order is
//! part of the protocol, the higher-ordered peer's list wins.

use crate::error::SecioError;
use crate::exchange::KeyAgreement;
use crate::{crypto::cipher::CipherType, Digest};

use std::cmp::Ordering;

const ECDH_P256: &str = "P-256";
const ECDH_P384: &str = "P-384";

const AES_128: &str = "AES-128";
const AES_256: &str = "AES-256";

const SHA_256: &str = "SHA256";
const SHA_512: &str = "SHA512";

pub(crate) const DEFAULT_AGREEMENTS_PROPOSITION: &str = "P-256,P-384";
pub(crate) const DEFAULT_CIPHERS_PROPOSITION: &str = "AES-128,AES-256";
pub(crate) const DEFAULT_DIGESTS_PROPOSITION: &str = "SHA256,SHA512";

/// Return a proposition string from the given sequence of `KeyAgreement` values.
pub fn key_agreements_proposition<'a, I>(exchanges: I) -> String
where
    I: IntoIterator<Item = &'a KeyAgreement>,
{
    let mut s = String::new();
    for x in exchanges {
        match x {
            KeyAgreement::EcdhP256 => {
                s.push_str(ECDH_P256);
                s.push(',')
            }
            KeyAgreement::EcdhP384 => {
                s.push_str(ECDH_P384);
                s.push(',')
            }
        }
    }
    s.pop(); // remove trailing comma if any
    s
}

/// Given two key agreement proposition strings try to figure out a match.
///
/// The `Ordering` parameter determines which argument is preferred. If `Less`
/// or `Equal` we try for each of `theirs` every one of `ours`, for `Greater`
/// it's the other way around.
pub fn select_agreement(r: Ordering, ours: &str, theirs: &str) -> Result<KeyAgreement, SecioError> {
    let (a, b) = match r {
        Ordering::Less | Ordering::Equal => (theirs, ours),
        Ordering::Greater => (ours, theirs),
    };
    for x in a.split(',') {
        if b.split(',').any(|y| x == y) {
            match x {
                ECDH_P256 => return Ok(KeyAgreement::EcdhP256),
                ECDH_P384 => return Ok(KeyAgreement::EcdhP384),
                _ => continue,
            }
        }
    }
    Err(SecioError::NoSupportIntersection)
}

/// Return a proposition string from the given sequence of `Cipher` values.
pub fn ciphers_proposition<'a, I>(ciphers: I) -> String
where
    I: IntoIterator<Item = &'a CipherType>,
{
    let mut s = String::new();
    for c in ciphers {
        match c {
            CipherType::Aes128Ctr => {
                s.push_str(AES_128);
                s.push(',')
            }
            CipherType::Aes256Ctr => {
                s.push_str(AES_256);
                s.push(',')
            }
        }
    }
    s.pop(); // remove trailing comma if any
    s
}

/// Given two cipher proposition strings try to figure out a match.
pub fn select_cipher(r: Ordering, ours: &str, theirs: &str) -> Result<CipherType, SecioError> {
    let (a, b) = match r {
        Ordering::Less | Ordering::Equal => (theirs, ours),
        Ordering::Greater => (ours, theirs),
    };
    for x in a.split(',') {
        if b.split(',').any(|y| x == y) {
            match x {
                AES_128 => return Ok(CipherType::Aes128Ctr),
                AES_256 => return Ok(CipherType::Aes256Ctr),
                _ => continue,
            }
        }
    }
    Err(SecioError::NoSupportIntersection)
}

/// Return a proposition string from the given sequence of `Digest` values.
pub fn digests_proposition<'a, I>(digests: I) -> String
where
    I: IntoIterator<Item = &'a Digest>,
{
    let mut s = String::new();
    for d in digests {
        match d {
            Digest::Sha256 => {
                s.push_str(SHA_256);
                s.push(',')
            }
            Digest::Sha512 => {
                s.push_str(SHA_512);
                s.push(',')
            }
        }
    }
    s.pop(); // remove trailing comma if any
    s
}

/// Given two digest proposition strings try to figure out a match.
pub fn select_digest(r: Ordering, ours: &str, theirs: &str) -> Result<Digest, SecioError> {
    let (a, b) = match r {
        Ordering::Less | Ordering::Equal => (theirs, ours),
        Ordering::Greater => (ours, theirs),
    };
    for x in a.split(',') {
        if b.split(',').any(|y| x == y) {
            match x {
                SHA_256 => return Ok(Digest::Sha256),
                SHA_512 => return Ok(Digest::Sha512),
                _ => continue,
            }
        }
    }
    Err(SecioError::NoSupportIntersection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_side_order_wins() {
        // the greater side prefers AES-256; the lesser side lists AES-128 first
        let ours = "AES-256,AES-128";
        let theirs = "AES-128,AES-256";
        assert_eq!(select_cipher(Ordering::Greater, ours, theirs).unwrap(), CipherType::Aes256Ctr);
        assert_eq!(select_cipher(Ordering::Less, ours, theirs).unwrap(), CipherType::Aes128Ctr);
    }

    #[test]
    fn unknown_entries_are_skipped() {
        let selected = select_digest(Ordering::Greater, "BLAKE3,SHA512", "SHA512,SHA256").unwrap();
        assert_eq!(selected, Digest::Sha512);
    }

    #[test]
    fn empty_intersection_fails() {
        assert!(matches!(
            select_agreement(Ordering::Greater, "P-256", "P-384"),
            Err(SecioError::NoSupportIntersection)
        ));
    }

    #[test]
    fn propositions_round_trip() {
        assert_eq!(
            key_agreements_proposition(&[KeyAgreement::EcdhP256, KeyAgreement::EcdhP384]),
            DEFAULT_AGREEMENTS_PROPOSITION
        );
        assert_eq!(
            ciphers_proposition(&[CipherType::Aes128Ctr, CipherType::Aes256Ctr]),
            DEFAULT_CIPHERS_PROPOSITION
        );
        assert_eq!(
            digests_proposition(&[Digest::Sha256, Digest::Sha512]),
            DEFAULT_DIGESTS_PROPOSITION
        );
    }
}
