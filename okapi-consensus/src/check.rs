//! Consensus check functions.

use primitive_types::U256;

use okapi_chain::block::{merkle, Block, Header};
use okapi_chain::transaction::Input;
use okapi_chain::work::CompactBits;
use okapi_state::{FinalizedState, SecondaryChain, UtxoSet};

use crate::error::{BlockError, TransactionError};
use crate::shadow;
use crate::subsidy;

/// Returns `Ok(())` if there is exactly one coinbase transaction in `block`,
/// and it is the first transaction.
pub fn coinbase_is_first(block: &Block) -> Result<(), BlockError> {
    let first = block.transactions.first().ok_or(BlockError::NoTransactions)?;
    if !first.is_coinbase() {
        return Err(BlockError::CoinbasePosition);
    }
    if block
        .transactions
        .iter()
        .skip(1)
        .any(|tx| tx.contains_coinbase_input())
    {
        return Err(BlockError::CoinbasePosition);
    }
    Ok(())
}

/// Returns `Ok(())` if the header commits to exactly this transaction list.
pub fn merkle_root_is_valid(block: &Block) -> Result<(), BlockError> {
    let actual: merkle::Root = block.transaction_hashes().into_iter().collect();
    if block.header.merkle_root != actual {
        return Err(BlockError::MerkleMismatch {
            header: block.header.merkle_root,
        });
    }
    Ok(())
}

/// Returns `Ok(())` if the header hash, read as a little-endian 256-bit
/// integer, falls below the target its own `bits` field claims.
pub fn pow_is_valid(header: &Header) -> Result<(), BlockError> {
    let proof = U256::from_little_endian(&header.hash().0);
    if proof < header.bits.expand() {
        Ok(())
    } else {
        Err(BlockError::PoWMismatch)
    }
}

/// Structural admission for gossiped blocks: the Merkle commitment and the
/// proof of work, both computable without any chain context.
pub fn structural(block: &Block) -> Result<(), BlockError> {
    merkle_root_is_valid(block)?;
    pow_is_valid(&block.header)
}

/// Returns `Ok(())` if `bits` is no easier than `current_target`.
pub fn difficulty_is_valid(bits: CompactBits, current_target: U256) -> Result<(), BlockError> {
    // u256 comparison: greater targets represent *less* work.
    if bits.expand() > current_target {
        return Err(BlockError::DifficultyViolation);
    }
    Ok(())
}

/// Whether `block` directly extends `tip`: hash linkage plus proof of work,
/// with the genesis rule (all-zero previous hash) for an empty chain.
pub fn extends(block: &Block, tip: Option<&Block>) -> bool {
    match tip {
        None => block.header.previous_block_hash.is_zero(),
        Some(tip) => {
            block.header.previous_block_hash == tip.hash() && pow_is_valid(&block.header).is_ok()
        }
    }
}

/// Contextual validation of a candidate block (spec'd on a shadow UTXO set
/// at the block's ancestor tip).
///
/// Every non-coinbase input must reference a live output in the shadow set
/// and carry a valid signature, and the coinbase must not mint more than the
/// height's reward plus the fees the block collects.
pub fn contextual(
    block: &Block,
    utxos: &UtxoSet,
    store: &FinalizedState,
    secondary: &SecondaryChain,
) -> Result<(), BlockError> {
    let shadow = shadow::shadow_view(block, utxos.snapshot(), store, secondary)?;

    let mut mined: i64 = 0;
    let mut fees: i64 = 0;
    for tx in &block.transactions {
        if tx.is_coinbase() {
            mined = tx.outputs.first().map(|output| output.value).unwrap_or(0);
            continue;
        }
        let id = tx.hash();
        let mut input_total: i64 = 0;
        for (index, input) in tx.inputs.iter().enumerate() {
            let outpoint = match input {
                Input::PrevOut { outpoint, .. } => outpoint,
                Input::Coinbase { .. } => return Err(BlockError::CoinbasePosition),
            };
            let entry = shadow
                .get(&outpoint.hash)
                .ok_or(TransactionError::UnknownInput(outpoint.hash))?;
            let prev_output = entry
                .output(outpoint.index)
                .ok_or(TransactionError::DoubleSpend(*outpoint))?;
            if !tx.verify_input(index, &prev_output.script_pubkey) {
                return Err(TransactionError::BadSignature { tx: id, index }.into());
            }
            input_total += prev_output.value;
        }
        fees += input_total - tx.output_total();
    }

    if mined - fees > subsidy::block_reward(block.height) {
        return Err(BlockError::RewardTooLarge);
    }
    Ok(())
}
