//! The transaction Merkle tree.

use std::{fmt, io, iter::FromIterator};

use serde::{Deserialize, Serialize};

use crate::serialization::sha256d;
use crate::transaction;
use crate::{OkapiDeserialize, OkapiSerialize, SerializationError};

/// The root of the transaction Merkle tree.
///
/// Leaves are transaction hashes in block order; when a level has an odd
/// number of hashes the last is duplicated; a parent is the sha256d of the
/// concatenation of its children. The process repeats until one hash
/// remains.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Root(pub [u8; 32]);

impl FromIterator<transaction::Hash> for Root {
    fn from_iter<I>(hashes: I) -> Self
    where
        I: IntoIterator<Item = transaction::Hash>,
    {
        let mut level: Vec<[u8; 32]> = hashes.into_iter().map(|hash| hash.0).collect();
        // Blocks always carry a coinbase, so an empty level cannot occur for
        // a well-formed block; the zero root is a harmless placeholder.
        if level.is_empty() {
            return Root([0; 32]);
        }
        while level.len() > 1 {
            if level.len() % 2 == 1 {
                let last = *level.last().expect("level is non-empty");
                level.push(last);
            }
            level = level
                .chunks(2)
                .map(|pair| {
                    let mut concat = [0u8; 64];
                    concat[..32].copy_from_slice(&pair[0]);
                    concat[32..].copy_from_slice(&pair[1]);
                    sha256d::hash256(&concat)
                })
                .collect();
        }
        Root(level[0])
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl OkapiSerialize for Root {
    fn okapi_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        writer.write_all(&self.0)
    }
}

impl OkapiDeserialize for Root {
    fn okapi_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::okapi_deserialize(&mut reader)?))
    }
}
