//! Pay-to-public-key-hash addresses.
//!
//! An address is a version byte followed by the hash160 of a compressed
//! public key, Base58Check encoded: the payload is extended with the first
//! four bytes of its sha256d before encoding, and decoding verifies that
//! checksum.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::PublicKey;

/// The version byte prepended to the hash before encoding.
const P2PKH_VERSION: u8 = 0x00;

/// An address decoding error.
#[derive(Error, Debug, Eq, PartialEq)]
pub enum AddressError {
    /// The trailing four checksum bytes do not match the payload.
    #[error("address checksum mismatch")]
    AddressChecksum,
    /// Wrong length, wrong version byte, or characters outside the Base58
    /// alphabet.
    #[error("malformed address")]
    Malformed,
}

/// A P2PKH address: the 20-byte hash160 of the recipient's public key.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub pub_key_hash: [u8; 20],
}

impl Address {
    pub fn new(pub_key_hash: [u8; 20]) -> Address {
        Address { pub_key_hash }
    }
}

impl From<&PublicKey> for Address {
    fn from(key: &PublicKey) -> Address {
        Address {
            pub_key_hash: key.hash160(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut payload = [0u8; 21];
        payload[0] = P2PKH_VERSION;
        payload[1..].copy_from_slice(&self.pub_key_hash);
        f.write_str(&bs58::encode(payload).with_check().into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Address")
            .field("pub_key_hash", &hex::encode(self.pub_key_hash))
            .finish()
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let payload = bs58::decode(s).with_check(None).into_vec().map_err(|e| {
            match e {
                bs58::decode::Error::InvalidChecksum { .. } => AddressError::AddressChecksum,
                _ => AddressError::Malformed,
            }
        })?;
        if payload.len() != 21 || payload[0] != P2PKH_VERSION {
            return Err(AddressError::Malformed);
        }
        let mut pub_key_hash = [0u8; 20];
        pub_key_hash.copy_from_slice(&payload[1..]);
        Ok(Address { pub_key_hash })
    }
}
