//! Chain-wide constants.

use crate::block;

/// The block and transaction version this node produces.
pub const VERSION: u32 = 1;

/// The `previous_block_hash` of the genesis block.
pub const GENESIS_PREVIOUS_BLOCK_HASH: block::Hash = block::Hash([0; 32]);

/// One whole coin, in satoshis.
pub const COIN: i64 = 100_000_000;
