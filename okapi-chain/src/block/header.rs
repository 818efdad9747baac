use std::io::{Cursor, Read, Write};

use okapi_serde_derive::OkSerialize;
use serde::{Deserialize, Serialize};

use crate::cached::Cached;
use crate::serialization::sha256d;
use crate::work::CompactBits;
use crate::{OkapiDeserialize, OkapiSerialize, SerializationError};

use super::{merkle, Hash};

/// A block header, containing metadata about a block.
///
/// Blocks are chained together by the backwards reference (previous header
/// hash) in the header: each block points to its parent, all the way back to
/// the genesis block.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, OkSerialize)]
pub struct Header {
    /// The block's version field.
    pub version: u32,

    /// The hash of the previous block. No previous block can change without
    /// also changing this header, and therefore this block's hash.
    pub previous_block_hash: Hash,

    /// The root of the transaction Merkle tree, binding the header to the
    /// transactions in the block.
    pub merkle_root: merkle::Root,

    /// When the miner started hashing the header (according to the miner),
    /// seconds since the Unix epoch.
    pub time: u32,

    /// The compact encoding of the target threshold this header's hash must
    /// fall below.
    pub bits: CompactBits,

    /// An arbitrary field miners change to vary the header hash while
    /// searching for one below the target threshold.
    pub nonce: u32,

    /// The hash of this header, cached after the first computation. Not part
    /// of the consensus serialization.
    hash: Cached<Hash>,
}

impl Header {
    /// The length of a serialized header, in bytes.
    pub const fn len() -> usize {
        80
    }

    pub fn new(
        version: u32,
        previous_block_hash: Hash,
        merkle_root: merkle::Root,
        time: u32,
        bits: CompactBits,
        nonce: u32,
    ) -> Header {
        Header {
            version,
            previous_block_hash,
            merkle_root,
            time,
            bits,
            nonce,
            hash: Cached::new(),
        }
    }

    /// The hash of this header, from the cache when available.
    pub fn hash(&self) -> Hash {
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        Hash::from(self)
    }

    /// Recompute and cache the hash after a field (typically the nonce)
    /// changed.
    pub fn recompute_hash(&mut self) -> Hash {
        self.hash.clear();
        let hash = Hash::from(&*self);
        self.hash = Cached::from(hash);
        hash
    }
}

/// Deserializes a header from its 80 canonical bytes, hashing them once on
/// the way through so the hash cache is populated for free.
impl OkapiDeserialize for Header {
    fn okapi_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut raw = [0u8; Header::len()];
        reader.read_exact(&mut raw)?;

        let mut hash_writer = sha256d::Writer::default();
        hash_writer
            .write_all(&raw)
            .expect("sha256d::Writer is infallible");
        let own_hash = Hash(hash_writer.finish());

        let mut src = Cursor::new(&raw[..]);
        Ok(Header {
            version: u32::okapi_deserialize(&mut src)?,
            previous_block_hash: Hash::okapi_deserialize(&mut src)?,
            merkle_root: merkle::Root::okapi_deserialize(&mut src)?,
            time: u32::okapi_deserialize(&mut src)?,
            bits: CompactBits::okapi_deserialize(&mut src)?,
            nonce: u32::okapi_deserialize(&mut src)?,
            hash: Cached::from(own_hash),
        })
    }
}
