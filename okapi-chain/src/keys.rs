//! ECDSA keys over secp256k1.
//!
//! Signing uses RFC6979 deterministic nonces and produces low-s normalized
//! DER signatures, so signing the same digest with the same key always
//! yields identical bytes.

use lazy_static::lazy_static;
use ripemd::Ripemd160;
use secp256k1::{ecdsa, All, Message, Secp256k1};
use sha2::{Digest, Sha256};
use thiserror::Error;

lazy_static! {
    static ref SECP: Secp256k1<All> = Secp256k1::new();
}

/// `hash160(x) = ripemd160(sha256(x))`, the 20-byte on-chain identifier of a
/// payee.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut output = [0u8; 20];
    output.copy_from_slice(&ripe);
    output
}

/// A key-handling error.
#[derive(Error, Debug, Eq, PartialEq)]
pub enum KeyError {
    /// Key bytes that do not describe a valid secp256k1 point or scalar.
    #[error("malformed key")]
    MalformedKey,
    /// A signature that is not valid DER or does not verify.
    #[error("bad signature")]
    BadSignature,
}

/// A secp256k1 private key.
#[derive(Clone)]
pub struct PrivateKey(secp256k1::SecretKey);

impl PrivateKey {
    /// Generate a fresh random key.
    pub fn generate() -> PrivateKey {
        PrivateKey(secp256k1::SecretKey::new(&mut rand::thread_rng()))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<PrivateKey, KeyError> {
        secp256k1::SecretKey::from_slice(bytes)
            .map(PrivateKey)
            .map_err(|_| KeyError::MalformedKey)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(secp256k1::PublicKey::from_secret_key(&SECP, &self.0))
    }

    /// Sign a 32-byte digest. Deterministic: the same key and digest always
    /// produce the same signature.
    pub fn sign(&self, digest: &[u8; 32]) -> Signature {
        let message =
            Message::from_digest_slice(&digest[..]).expect("digest is exactly 32 bytes");
        Signature(SECP.sign_ecdsa(&message, &self.0))
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// A secp256k1 public key, serialized in 33-byte compressed SEC form.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PublicKey(secp256k1::PublicKey);

impl PublicKey {
    pub fn from_slice(bytes: &[u8]) -> Result<PublicKey, KeyError> {
        secp256k1::PublicKey::from_slice(bytes)
            .map(PublicKey)
            .map_err(|_| KeyError::MalformedKey)
    }

    /// The compressed SEC encoding.
    pub fn serialize(&self) -> [u8; 33] {
        self.0.serialize()
    }

    /// The hash160 of the compressed SEC encoding; the owner id used by
    /// P2PKH scripts and the UTXO index.
    pub fn hash160(&self) -> [u8; 20] {
        hash160(&self.serialize())
    }

    /// Check `signature` over `digest`.
    pub fn verify(&self, digest: &[u8; 32], signature: &Signature) -> Result<(), KeyError> {
        let message =
            Message::from_digest_slice(&digest[..]).expect("digest is exactly 32 bytes");
        let mut normalized = signature.0;
        normalized.normalize_s();
        SECP.verify_ecdsa(&message, &normalized, &self.0)
            .map_err(|_| KeyError::BadSignature)
    }
}

/// A DER-encoded ECDSA signature.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Signature(ecdsa::Signature);

impl Signature {
    pub fn from_der(bytes: &[u8]) -> Result<Signature, KeyError> {
        ecdsa::Signature::from_der(bytes)
            .map(Signature)
            .map_err(|_| KeyError::BadSignature)
    }

    pub fn serialize_der(&self) -> Vec<u8> {
        self.0.serialize_der().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let key = PrivateKey::generate();
        let digest = crate::serialization::sha256d::hash256(b"spend one coin");
        let signature = key.sign(&digest);
        assert_eq!(key.public_key().verify(&digest, &signature), Ok(()));
    }

    #[test]
    fn deterministic_signatures() {
        let key = PrivateKey::from_slice(&[0x42; 32]).unwrap();
        let digest = crate::serialization::sha256d::hash256(b"rfc6979");
        assert_eq!(
            key.sign(&digest).serialize_der(),
            key.sign(&digest).serialize_der()
        );
    }

    #[test]
    fn tampered_digest_fails() {
        let key = PrivateKey::generate();
        let digest = crate::serialization::sha256d::hash256(b"original");
        let signature = key.sign(&digest);
        let tampered = crate::serialization::sha256d::hash256(b"tampered");
        assert_eq!(
            key.public_key().verify(&tampered, &signature),
            Err(KeyError::BadSignature)
        );
    }

    #[test]
    fn wrong_key_fails() {
        let digest = crate::serialization::sha256d::hash256(b"message");
        let signature = PrivateKey::generate().sign(&digest);
        let other = PrivateKey::generate();
        assert_eq!(
            other.public_key().verify(&digest, &signature),
            Err(KeyError::BadSignature)
        );
    }

    #[test]
    fn der_round_trip() {
        let key = PrivateKey::generate();
        let digest = crate::serialization::sha256d::hash256(b"der");
        let signature = key.sign(&digest);
        let decoded = Signature::from_der(&signature.serialize_der()).unwrap();
        assert_eq!(signature, decoded);
    }

    #[test]
    fn malformed_key_rejected() {
        assert_eq!(
            PublicKey::from_slice(&[0u8; 33]).unwrap_err(),
            KeyError::MalformedKey
        );
        assert_eq!(
            PrivateKey::from_slice(&[0u8; 32]).unwrap_err(),
            KeyError::MalformedKey
        );
    }
}
