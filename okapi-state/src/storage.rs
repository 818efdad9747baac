//! The finalized chain state, stored in sled.
//!
//! The canonical chain is keyed by big-endian height so the last tree entry
//! is the tip, with secondary lookups by block hash and by transaction id.
//! The peer address table shares the same database. Any document store
//! could implement this interface; sled keeps the node self-contained.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use okapi_chain::block::{self, Block, Height};
use okapi_chain::transaction::{self, Transaction};
use okapi_chain::{OkapiDeserialize, OkapiSerialize, SerializationError};

/// A persistence error.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sled(#[from] sled::Error),
    #[error("stored value corrupt: {0}")]
    Serialization(#[from] SerializationError),
}

/// The sled-backed canonical chain and node table.
pub struct FinalizedState {
    block_by_height: sled::Tree,
    height_by_hash: sled::Tree,
    tx_by_hash: sled::Tree,
    nodes: sled::Tree,
}

impl FinalizedState {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<FinalizedState, StorageError> {
        Self::from_db(sled::Config::new().path(path).open()?)
    }

    /// An in-memory database for tests.
    pub fn temporary() -> Result<FinalizedState, StorageError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<FinalizedState, StorageError> {
        Ok(FinalizedState {
            block_by_height: db.open_tree(b"block_by_height")?,
            height_by_hash: db.open_tree(b"height_by_hash")?,
            tx_by_hash: db.open_tree(b"tx_by_hash")?,
            nodes: db.open_tree(b"nodes")?,
        })
    }

    /// Insert a block at its height, replacing any previous occupant.
    ///
    /// On duplicate height the displaced block's hash and transaction index
    /// entries are removed before the new block's are written.
    pub fn save_block(&self, block: &Block) -> Result<(), StorageError> {
        let height_key = block.height.0.to_be_bytes();
        if let Some(previous) = self.block_by_height.get(height_key)? {
            let displaced = decode_block(&previous)?;
            for tx in &displaced.transactions {
                self.tx_by_hash.remove(tx.hash().0)?;
            }
            self.height_by_hash.remove(displaced.hash().0)?;
        }

        let hash = block.hash();
        self.block_by_height
            .insert(&height_key[..], encode(block)?)?;
        self.height_by_hash.insert(hash.0.as_ref(), &height_key[..])?;
        for tx in &block.transactions {
            let mut value = Vec::with_capacity(32 + tx.serialized_size());
            value.extend_from_slice(&hash.0);
            tx.okapi_serialize(&mut value)
                .map_err(SerializationError::from)?;
            self.tx_by_hash.insert(tx.hash().0, value)?;
        }

        trace!(height = block.height.0, %hash, "saved block");
        metrics::counter!("state.committed.block.count").increment(1);
        metrics::gauge!("state.committed.block.height").set(block.height.0 as f64);
        Ok(())
    }

    pub fn block(&self, height: Height) -> Result<Option<Arc<Block>>, StorageError> {
        match self.block_by_height.get(height.0.to_be_bytes())? {
            Some(bytes) => Ok(Some(Arc::new(decode_block(&bytes)?))),
            None => Ok(None),
        }
    }

    pub fn find_block(&self, hash: &block::Hash) -> Result<Option<Arc<Block>>, StorageError> {
        match self.height_by_hash.get(hash.0)? {
            Some(height_bytes) => self.block(decode_height(&height_bytes)?),
            None => Ok(None),
        }
    }

    /// The block at the greatest height, if the chain is non-empty.
    pub fn last_block(&self) -> Result<Option<Arc<Block>>, StorageError> {
        match self.block_by_height.iter().rev().next().transpose()? {
            Some((_, bytes)) => Ok(Some(Arc::new(decode_block(&bytes)?))),
            None => Ok(None),
        }
    }

    /// Up to `limit` consecutive blocks starting at `start`.
    pub fn blocks(&self, start: Height, limit: usize) -> Result<Vec<Arc<Block>>, StorageError> {
        let mut result = Vec::new();
        for height in start.0..start.0.saturating_add(limit as u32) {
            match self.block(Height(height))? {
                Some(block) => result.push(block),
                None => break,
            }
        }
        Ok(result)
    }

    /// The whole chain, in height order. Used to rebuild the UTXO set on
    /// boot.
    pub fn all_blocks(&self) -> Result<Vec<Arc<Block>>, StorageError> {
        let mut result = Vec::new();
        for entry in self.block_by_height.iter() {
            let (_, bytes) = entry?;
            result.push(Arc::new(decode_block(&bytes)?));
        }
        Ok(result)
    }

    /// The number of stored blocks; one more than the tip height on a
    /// gapless chain.
    pub fn block_count(&self) -> u32 {
        self.block_by_height.len() as u32
    }

    /// A confirmed transaction and the hash of the block carrying it.
    pub fn find_transaction(
        &self,
        id: &transaction::Hash,
    ) -> Result<Option<(Arc<Transaction>, block::Hash)>, StorageError> {
        match self.tx_by_hash.get(id.0)? {
            Some(bytes) => {
                if bytes.len() < 32 {
                    return Err(StorageError::Serialization(SerializationError::Parse(
                        "transaction index entry shorter than a block hash",
                    )));
                }
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&bytes[..32]);
                let tx = Transaction::okapi_deserialize(&bytes[32..])?;
                Ok(Some((Arc::new(tx), block::Hash(hash))))
            }
            None => Ok(None),
        }
    }

    /// Remove the blocks at heights `from..=to`, e.g. when sync discovers a
    /// poisoned run of blocks.
    pub fn delete_blocks(&self, from: Height, to: Height) -> Result<(), StorageError> {
        for height in from.0..=to.0 {
            if let Some(bytes) = self.block_by_height.remove(height.to_be_bytes())? {
                let displaced = decode_block(&bytes)?;
                for tx in &displaced.transactions {
                    self.tx_by_hash.remove(tx.hash().0)?;
                }
                self.height_by_hash.remove(displaced.hash().0)?;
            }
        }
        Ok(())
    }

    /// All known peer addresses, as `host:port` strings.
    pub fn all_nodes(&self) -> Result<Vec<String>, StorageError> {
        let mut nodes = Vec::new();
        for entry in self.nodes.iter() {
            let (address, _) = entry?;
            match String::from_utf8(address.to_vec()) {
                Ok(address) => nodes.push(address),
                Err(_) => {
                    return Err(StorageError::Serialization(SerializationError::Parse(
                        "stored node address is not utf-8",
                    )))
                }
            }
        }
        Ok(nodes)
    }

    pub fn add_node(&self, address: &str) -> Result<(), StorageError> {
        self.nodes.insert(address.as_bytes(), Vec::new())?;
        Ok(())
    }

    /// Replace the node table with `nodes`.
    pub fn replace_nodes(&self, nodes: &[String]) -> Result<(), StorageError> {
        self.nodes.clear()?;
        for address in nodes {
            self.add_node(address)?;
        }
        Ok(())
    }
}

fn encode(block: &Block) -> Result<Vec<u8>, StorageError> {
    Ok(block
        .okapi_serialize_to_vec()
        .map_err(SerializationError::from)?)
}

fn decode_block(bytes: &[u8]) -> Result<Block, StorageError> {
    Ok(Block::okapi_deserialize(bytes)?)
}

fn decode_height(bytes: &[u8]) -> Result<Height, StorageError> {
    if bytes.len() != 4 {
        return Err(StorageError::Serialization(SerializationError::Parse(
            "height key must be four bytes",
        )));
    }
    let mut be = [0u8; 4];
    be.copy_from_slice(bytes);
    Ok(Height(u32::from_be_bytes(be)))
}
