//! Blocks and block-related structures (heights, headers, the Merkle tree).

mod hash;
mod header;
mod height;

pub mod merkle;

#[cfg(test)]
mod tests;

use std::{convert::TryInto, fmt, io::Read, sync::Arc};

use okapi_serde_derive::OkSerialize;
use serde::{Deserialize, Serialize};

use crate::compactint::CompactInt;
use crate::transaction::Transaction;
use crate::{OkapiDeserialize, OkapiSerialize, SerializationError};

pub use hash::Hash;
pub use header::Header;
pub use height::Height;

/// The maximum size of a block, in bytes.
pub const MAX_BLOCK_BYTES: u64 = 1_048_576;

/// An Okapi block: a height, a header, and a list of transactions of which
/// the first is the coinbase.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, OkSerialize)]
pub struct Block {
    /// The height of this block on its chain; unique on the canonical chain.
    pub height: Height,
    /// The serialized size the miner reported for this block, in bytes.
    pub size: u32,
    /// The block header, containing block metadata.
    pub header: Header,
    /// The block transactions.
    pub transactions: Vec<Arc<Transaction>>,
}

impl Block {
    /// Compute the hash of this block.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// The hashes of this block's transactions, in block order.
    pub fn transaction_hashes(&self) -> Vec<crate::transaction::Hash> {
        self.transactions.iter().map(|tx| tx.hash()).collect()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("height", &self.height.0)
            .field("hash", &format_args!("{}", self.hash()))
            .finish()
    }
}

impl OkapiDeserialize for Block {
    fn okapi_deserialize<R: Read>(reader: R) -> Result<Self, SerializationError> {
        // The consensus size limit covers the header and transactions; the
        // height, size, and count fields need a little slack on top.
        let mut src = reader.take(MAX_BLOCK_BYTES + 64);
        let height = Height::okapi_deserialize(&mut src)?;
        let size = u32::okapi_deserialize(&mut src)?;
        let header = Header::okapi_deserialize(&mut src)?;

        let tx_count = CompactInt::okapi_deserialize(&mut src)?.value();
        // Sanity-check the claimed count against the smallest possible
        // transaction so a bogus header cannot force a huge preallocation.
        if tx_count > MAX_BLOCK_BYTES / (36 * 4) {
            return Err(SerializationError::Parse(
                "block claims more transactions than could fit in a block",
            ));
        }
        let mut transactions =
            Vec::with_capacity(tx_count.try_into().expect("count fits after sanity check"));
        for _ in 0..tx_count {
            transactions.push(<Arc<Transaction>>::okapi_deserialize(&mut src)?);
        }
        Ok(Block {
            height,
            size,
            header,
            transactions,
        })
    }
}

impl<'a> From<&'a Block> for Hash {
    fn from(block: &'a Block) -> Hash {
        (&block.header).into()
    }
}
