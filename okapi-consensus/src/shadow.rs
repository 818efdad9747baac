//! Shadow UTXO sets for validating blocks that fork off the canonical
//! chain.
//!
//! A candidate block must be judged against the UTXO state at its own
//! ancestor tip, not the live tip. The shadow view starts from a clone of
//! the live set, rolls the canonical blocks that overlap the candidate's
//! secondary-chain prefix back out (restoring the outputs they consumed
//! from the store), and then rolls the prefix itself forward.

use std::sync::Arc;

use okapi_chain::block::Block;
use okapi_chain::transaction::Input;
use okapi_state::{FinalizedState, SecondaryChain, StorageError, UtxoView};

/// Materialize the UTXO view at `block`'s ancestor tip.
pub fn shadow_view(
    block: &Block,
    mut view: UtxoView,
    store: &FinalizedState,
    secondary: &SecondaryChain,
) -> Result<UtxoView, StorageError> {
    // The candidate's prefix in the secondary chain, newest first.
    let mut prefix: Vec<Arc<Block>> = Vec::new();
    let mut prev_hash = block.header.previous_block_hash;
    while let Some(ancestor) = secondary.get(&prev_hash) {
        prev_hash = ancestor.header.previous_block_hash;
        prefix.push(ancestor);
    }

    // Roll back the canonical blocks at the heights the candidate chain
    // covers.
    let heights =
        std::iter::once(block.height).chain(prefix.iter().map(|ancestor| ancestor.height));
    for height in heights {
        let canonical = match store.block(height)? {
            Some(canonical) => canonical,
            None => continue,
        };
        for tx in &canonical.transactions {
            view.remove_entry(&tx.hash());
            if tx.is_coinbase() {
                continue;
            }
            for input in &tx.inputs {
                if let Input::PrevOut { outpoint, .. } = input {
                    if let Some((prev_tx, _)) = store.find_transaction(&outpoint.hash)? {
                        view.restore(outpoint, &prev_tx);
                    }
                }
            }
        }
    }

    // Apply the prefix, oldest first, to arrive at the candidate's parent
    // state.
    for ancestor in prefix.iter().rev() {
        for tx in &ancestor.transactions {
            view.apply(tx);
        }
    }

    Ok(view)
}
